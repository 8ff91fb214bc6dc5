//! Named-pipe metadata sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use base64::Engine;

use super::MetadataPackage;
use crate::queue::BoundedQueue;

/// Render one metadata item in the pipe's text/XML-ish wire format.
/// The `<data>` section is omitted entirely when `data` is empty.
pub fn format_pipe_item(type_tag: [u8; 4], code_tag: [u8; 4], data: &[u8]) -> String {
    let type_hex = u32::from_be_bytes(type_tag);
    let code_hex = u32::from_be_bytes(code_tag);
    let mut item = format!(
        "<item><type>{type_hex:x}</type><code>{code_hex:x}</code><length>{}</length>\n",
        data.len()
    );
    if !data.is_empty() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        item.push_str("<data encoding=\"base64\">\n");
        for line in encoded.as_bytes().chunks(76) {
            item.push_str(std::str::from_utf8(line).expect("base64 alphabet is ASCII"));
            item.push('\n');
        }
        item.push_str("</data>");
    }
    item.push_str("</item>\n");
    item
}

/// Create the FIFO at `path` with mode 0666 if it does not already exist.
#[cfg(unix)]
pub fn ensure_fifo(path: &str) -> std::io::Result<()> {
    use nix::sys::stat::Mode;
    match nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(err) => Err(std::io::Error::from(err)),
    }
}

/// Consume `queue` until `stop` is set, writing each item to the pipe at
/// `path`. The pipe handle is reopened lazily after a failed write — a
/// reader going away and coming back (e.g. the metadata consumer
/// restarting) should not need this thread restarted.
pub fn run(path: String, queue: Arc<BoundedQueue<MetadataPackage>>, stop: Arc<AtomicBool>) {
    #[cfg(unix)]
    if let Err(err) = ensure_fifo(&path) {
        tracing::warn!(path, %err, "failed to create metadata pipe");
    }

    let mut file = OpenOptions::new().write(true).open(&path).ok();

    while let Some(package) = queue.dequeue(&stop) {
        let text = format_pipe_item(package.type_tag, package.code_tag, package.bytes());

        if file.is_none() {
            file = OpenOptions::new().write(true).open(&path).ok();
        }

        if let Some(handle) = file.as_mut() {
            if let Err(err) = handle.write_all(text.as_bytes()) {
                tracing::warn!(path, %err, "metadata pipe write failed, will reopen");
                file = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_data_section_for_empty_payload() {
        let item = format_pipe_item(*b"ssnc", *b"pbeg", &[]);
        assert_eq!(item, "<item><type>73736e63</type><code>70626567</code><length>0</length>\n</item>\n");
    }

    #[test]
    fn wraps_base64_body_at_76_columns() {
        let item = format_pipe_item(*b"core", *b"asal", b"Album Name");
        assert!(item.contains("<data encoding=\"base64\">\n"));
        let encoded_line = item.lines().find(|l| !l.starts_with('<')).unwrap();
        assert!(encoded_line.len() <= 76);
        assert!(item.ends_with("</data></item>\n"));
    }

    #[cfg(unix)]
    #[test]
    fn ensure_fifo_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("raop-rtsp-test-fifo-{}", std::process::id()));
        let path = dir.to_string_lossy().into_owned();
        assert!(ensure_fifo(&path).is_ok());
        assert!(ensure_fifo(&path).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
