//! Content verification of job inputs across the web-service holding area
//! and the cluster head node.

use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::server::dispatch::DispatchResult;
use crate::server::remote::RemoteSession;

/// Compares content fingerprints of every file under `local_dir` against the
/// files under `remote_dir` on the head node.
///
/// A mismatch in file count or in any single digest fails the whole
/// verification; there is no partial credit. Errors on either side also
/// count as a failed verification rather than a distinguished error: the
/// only recourse of the caller is to not dispatch and try again later.
pub async fn verify(session: &dyn RemoteSession, local_dir: &Path, remote_dir: &str) -> bool {
    // The two sides are independent, hash them in parallel.
    let local_task = {
        let local_dir = local_dir.to_path_buf();
        tokio::task::spawn_blocking(move || local_fingerprints(&local_dir))
    };
    let (local, remote) = futures::join!(local_task, remote_fingerprints(session, remote_dir));

    let local = match local {
        Ok(result) => result,
        Err(error) => {
            log::warn!("Local fingerprint task failed: {error:?}");
            return false;
        }
    };
    match (local, remote) {
        (Ok(local), Ok(remote)) => {
            if local == remote {
                true
            } else {
                log::warn!(
                    "Fingerprint mismatch between {} ({} files) and remote {} ({} files)",
                    local_dir.display(),
                    local.len(),
                    remote_dir,
                    remote.len()
                );
                false
            }
        }
        (Err(error), _) => {
            log::warn!("Cannot fingerprint {}: {error:?}", local_dir.display());
            false
        }
        (_, Err(error)) => {
            log::warn!("Cannot fingerprint remote {remote_dir}: {error:?}");
            false
        }
    }
}

/// SHA-256 digests of every regular file under the directory, hex encoded.
///
/// The digests are sorted before returning: filesystem enumeration order is
/// not guaranteed, so both sides of a comparison have to be sorted for the
/// comparison to be meaningful.
pub fn local_fingerprints(dir: &Path) -> DispatchResult<Vec<String>> {
    let mut digests = Vec::new();
    collect_digests(dir, &mut digests)
        .with_context(|| format!("Cannot fingerprint {}", dir.display()))?;
    digests.sort_unstable();
    Ok(digests)
}

fn collect_digests(dir: &Path, digests: &mut Vec<String>) -> DispatchResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_digests(&path, digests)?;
        } else {
            digests.push(file_digest(&path)?);
        }
    }
    Ok(())
}

fn file_digest(path: &Path) -> DispatchResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Digests of every file under the remote directory, computed on the head
/// node by the standard hashing tool and sorted locally.
pub async fn remote_fingerprints(
    session: &dyn RemoteSession,
    remote_dir: &str,
) -> DispatchResult<Vec<String>> {
    let command = remote_fingerprint_cmd(remote_dir);
    let output = session.execute(&command).await?;

    let mut digests = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let digest = line.split_whitespace().next().unwrap_or("");
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("Unexpected hashing output line: {line}");
        }
        digests.push(digest.to_string());
    }
    digests.sort_unstable();
    Ok(digests)
}

pub fn remote_fingerprint_cmd(remote_dir: &str) -> String {
    format!("find {remote_dir} -type f -exec sha256sum {{}} +")
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::path::{Path, PathBuf};
    use std::pin::Pin;

    use tempfile::TempDir;

    use crate::server::dispatch::DispatchResult;
    use crate::server::dispatch::verify::{local_fingerprints, verify};
    use crate::server::remote::RemoteSession;

    /// Serves hashing requests from a local directory posing as the remote
    /// side.
    struct DirSession {
        root: PathBuf,
        corrupt_first_digest: bool,
        fail_channel: bool,
    }

    impl DirSession {
        fn new(root: &Path) -> DirSession {
            DirSession {
                root: root.to_path_buf(),
                corrupt_first_digest: false,
                fail_channel: false,
            }
        }
    }

    impl RemoteSession for DirSession {
        fn copy_to_remote(
            &self,
            _local_dir: &Path,
            _remote_parent: &str,
        ) -> Pin<Box<dyn Future<Output = DispatchResult<()>>>> {
            Box::pin(std::future::ready(Ok(())))
        }

        fn execute(&self, _command: &str) -> Pin<Box<dyn Future<Output = DispatchResult<String>>>> {
            let result = if self.fail_channel {
                Err(anyhow::anyhow!("ssh execution failed"))
            } else {
                local_fingerprints(&self.root).map(|mut digests| {
                    if self.corrupt_first_digest && !digests.is_empty() {
                        let flipped = if digests[0].starts_with('0') { "1" } else { "0" };
                        digests[0].replace_range(0..1, flipped);
                    }
                    digests
                        .iter()
                        .map(|digest| format!("{digest}  {}/file", self.root.display()))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            };
            Box::pin(std::future::ready(result))
        }
    }

    fn write_files(dir: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn fingerprints_are_sorted_and_stable() {
        let dir = TempDir::new().unwrap();
        write_files(
            dir.path(),
            &[("b.fastq", "CCTG"), ("a.fastq", "ACGT"), ("sub/c.fastq", "TTAA")],
        );

        let first = local_fingerprints(dir.path()).unwrap();
        let second = local_fingerprints(dir.path()).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(first, sorted);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(local_fingerprints(&dir.path().join("nope")).is_err());
    }

    #[tokio::test]
    async fn exact_copy_verifies() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let files = [("r1.fastq", "ACGTACGT"), ("r2.fastq", "TTGGCCAA")];
        write_files(local.path(), &files);
        write_files(remote.path(), &files);

        let session = DirSession::new(remote.path());
        assert!(verify(&session, local.path(), "/jobs/x").await);
    }

    #[tokio::test]
    async fn verification_is_idempotent() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        write_files(local.path(), &[("r1.fastq", "ACGT")]);
        write_files(remote.path(), &[("r1.fastq", "ACGT")]);

        let session = DirSession::new(remote.path());
        assert!(verify(&session, local.path(), "/jobs/x").await);
        assert!(verify(&session, local.path(), "/jobs/x").await);
    }

    #[tokio::test]
    async fn single_flipped_byte_fails() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        write_files(local.path(), &[("r1.fastq", "ACGT"), ("r2.fastq", "TTGG")]);
        write_files(remote.path(), &[("r1.fastq", "ACGT"), ("r2.fastq", "TTGC")]);

        let session = DirSession::new(remote.path());
        assert!(!verify(&session, local.path(), "/jobs/x").await);
    }

    #[tokio::test]
    async fn file_count_mismatch_fails() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        write_files(local.path(), &[("r1.fastq", "ACGT"), ("r2.fastq", "TTGG")]);
        write_files(remote.path(), &[("r1.fastq", "ACGT")]);

        let session = DirSession::new(remote.path());
        assert!(!verify(&session, local.path(), "/jobs/x").await);
    }

    #[tokio::test]
    async fn corrupted_remote_digest_fails() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        write_files(local.path(), &[("r1.fastq", "ACGT")]);
        write_files(remote.path(), &[("r1.fastq", "ACGT")]);

        let mut session = DirSession::new(remote.path());
        session.corrupt_first_digest = true;
        assert!(!verify(&session, local.path(), "/jobs/x").await);
    }

    #[tokio::test]
    async fn remote_channel_error_fails_verification() {
        let local = TempDir::new().unwrap();
        write_files(local.path(), &[("r1.fastq", "ACGT")]);

        let mut session = DirSession::new(local.path());
        session.fail_channel = true;
        assert!(!verify(&session, local.path(), "/jobs/x").await);
    }
}
