use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn truncate_unicode(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width.saturating_sub(1) {
            result.push('\u{2026}');
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result
}

pub fn format_kib(kib: u64) -> String {
    const MIB: u64 = 1024;
    const GIB: u64 = 1024 * 1024;

    if kib >= GIB {
        format!("{:.1} GB", kib as f64 / GIB as f64)
    } else if kib >= MIB {
        format!("{:.1} MB", kib as f64 / MIB as f64)
    } else {
        format!("{} KB", kib)
    }
}

/// `h:mm:ss.cc`, or `m:ss.cc` under an hour.
pub fn format_centiseconds(cs: u64) -> String {
    let hundredths = cs % 100;
    let total_seconds = cs / 100;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}.{hundredths:02}")
    } else {
        format!("{minutes}:{seconds:02}.{hundredths:02}")
    }
}

pub fn format_per_mille(value: Option<u32>) -> String {
    match value {
        Some(v) => format!("{}.{}%", v / 10, v % 10),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_display_width() {
        assert_eq!(truncate_unicode("launchd", 10), "launchd");
        assert_eq!(truncate_unicode("/usr/libexec/logd", 8), "/usr/li\u{2026}");
        assert_eq!(truncate_unicode("日本語テキスト", 7), "日本語\u{2026}");
    }

    #[test]
    fn kib_scales() {
        assert_eq!(format_kib(512), "512 KB");
        assert_eq!(format_kib(1536), "1.5 MB");
        assert_eq!(format_kib(8 * 1024 * 1024), "8.0 GB");
    }

    #[test]
    fn centiseconds_as_clock() {
        assert_eq!(format_centiseconds(0), "0:00.00");
        assert_eq!(format_centiseconds(6_150), "1:01.50");
        assert_eq!(format_centiseconds(366_001), "1:01:00.01");
    }

    #[test]
    fn per_mille_as_percent() {
        assert_eq!(format_per_mille(Some(250)), "25.0%");
        assert_eq!(format_per_mille(Some(1000)), "100.0%");
        assert_eq!(format_per_mille(Some(7)), "0.7%");
        assert_eq!(format_per_mille(None), "n/a");
    }
}
