//! Decoder for the `KERN_PROCARGS2` argument blob.
//!
//! Layout: a native-endian `i32` argument count, the executable path, a run
//! of NUL padding, then `argc` NUL-terminated arguments followed by the
//! environment. Only the declared prefix of the buffer is ever read.

const ARGC_LEN: usize = std::mem::size_of::<i32>();

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArgumentBlob {
    pub executable: String,
    pub arguments: Vec<String>,
}

impl ArgumentBlob {
    /// Arguments joined by single spaces, with outer whitespace trimmed.
    pub fn command_line(&self) -> String {
        self.arguments.join(" ").trim().to_string()
    }
}

pub fn parse_argument_blob(blob: &[u8], declared_len: usize) -> ArgumentBlob {
    let data = &blob[..declared_len.min(blob.len())];
    let Some(argc_bytes) = data.get(..ARGC_LEN) else {
        return ArgumentBlob::default();
    };
    let argc = i32::from_ne_bytes(argc_bytes.try_into().unwrap_or_default());
    let mut remaining = argc.max(0) as usize;

    let (executable, mut pos) = read_field(data, ARGC_LEN);
    let mut arguments = Vec::with_capacity(remaining.min(64));

    while remaining > 0 && pos < data.len() {
        if data[pos] == 0 {
            pos += 1;
            continue;
        }
        let (field, end) = read_field(data, pos);
        arguments.push(field);
        remaining -= 1;
        pos = end;
    }

    ArgumentBlob {
        executable,
        arguments,
    }
}

/// Reconstructs the command line of one process, or an empty string when the
/// blob holds no arguments.
pub fn reconstruct_command_line(blob: &[u8], declared_len: usize) -> String {
    parse_argument_blob(blob, declared_len).command_line()
}

/// Reads one NUL-terminated field starting at `start`. Returns the decoded
/// text and the index of its terminator (or `data.len()` when unterminated).
fn read_field(data: &[u8], start: usize) -> (String, usize) {
    let tail = data.get(start..).unwrap_or_default();
    let len = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    (
        String::from_utf8_lossy(&tail[..len]).into_owned(),
        start + len,
    )
}
