use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Atomically replaces a file with the given contents.
///
/// The buffer is first written to a sibling temp file, flushed and synced
/// to disk, then renamed over the destination. Readers observe either the
/// old contents or the new ones, never a partial write.
///
/// The temp-file name is derived from the destination alone, so callers
/// must serialize concurrent writes to the same `path`.
pub async fn safe_write_all<P: AsRef<Path>, B: AsRef<[u8]>>(path: P, buf: B) -> io::Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("sync-tmp");

    let mut tmp_file = fs::File::create(&tmp_path).await?;
    tmp_file.write_all(buf.as_ref()).await?;
    tmp_file.flush().await?;
    tmp_file.sync_all().await?;
    drop(tmp_file);

    fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[tokio::test]
    async fn creates_file_with_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("target.log");

        safe_write_all(&path, b"hello\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("target.log");
        std::fs::write(&path, "old contents").unwrap();

        safe_write_all(&path, b"new contents").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new contents");
    }

    #[tokio::test]
    async fn leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("target.log");

        safe_write_all(&path, b"data").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["target.log"]);
    }
}
