use std::fs;
use std::path::Path;

const PLATFORM_DIR: &str = "src/system/platform/";

/// Every Rust source under `subdir`, as (manifest-relative path, contents),
/// sorted by path.
fn sources_under(subdir: &str) -> Vec<(String, String)> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut pending = vec![manifest.join(subdir)];
    let mut found = Vec::new();
    while let Some(dir) = pending.pop() {
        let Ok(listing) = fs::read_dir(&dir) else {
            continue;
        };
        for path in listing.flatten().map(|e| e.path()) {
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "rs") {
                continue;
            }
            let shown = path
                .strip_prefix(manifest)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            found.push((shown, fs::read_to_string(&path).unwrap_or_default()));
        }
    }
    found.sort();
    found
}

fn report(title: &str, hits: Vec<String>) {
    assert!(hits.is_empty(), "{title}:\n{}", hits.join("\n"));
}

#[test]
fn sampling_core_does_not_depend_on_outer_layers() {
    let outer = [
        "crate::config",
        "crate::report",
        "crate::format",
        "crate::telemetry",
        "tracing_subscriber",
        "color_eyre",
    ];
    let hits = sources_under("src/system")
        .into_iter()
        .flat_map(|(path, text)| {
            outer
                .iter()
                .filter(|needle| text.contains(*needle))
                .map(|needle| format!("{path}: reaches outward via `{needle}`"))
                .collect::<Vec<_>>()
        })
        .collect();
    report("sampling core reaches outer layers", hits);
}

#[test]
fn components_reach_the_kernel_only_through_the_trait() {
    let raw_kernel = ["libc::", "extern \"C\"", "platform::macos"];
    let hits = sources_under("src")
        .into_iter()
        .filter(|(path, _)| !path.starts_with(PLATFORM_DIR))
        .flat_map(|(path, text)| {
            raw_kernel
                .iter()
                .filter(|needle| text.contains(*needle))
                .map(|needle| format!("{path}: calls the kernel through `{needle}`"))
                .collect::<Vec<_>>()
        })
        .collect();
    report("kernel access outside the platform layer", hits);
}

#[test]
fn target_os_cfg_is_scoped_to_system_platform() {
    let hits = sources_under("src")
        .into_iter()
        .filter(|(path, text)| text.contains("target_os") && !path.starts_with(PLATFORM_DIR))
        .map(|(path, _)| format!("{path}: OS-specific cfg belongs in {PLATFORM_DIR}"))
        .collect();
    report("target_os cfg outside the platform layer", hits);
}
