//! Streaming authenticated file encryption
//!
//! Segmented AES-256-GCM with a fresh HKDF-derived key per file:
//!
//! ```text
//! header  = "INVX" | version(1) | salt(32) | nonce_prefix(7)
//! segment = AES-GCM(key, prefix | index(u32 BE) | last(u8), chunk, aad = header)
//! ```
//!
//! Plaintext is cut into 4096-byte chunks; only the final segment carries
//! `last = 1`, so truncation or reordering is detected on read.

use crate::security::{random_bytes, MasterKey};
use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const MAGIC: &[u8; 4] = b"INVX";
const VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_PREFIX_LEN: usize = 7;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_PREFIX_LEN;
const TAG_LEN: usize = 16;
const KEY_INFO: &str = "inventory-encrypted-file";

/// Plaintext bytes per segment
pub const SEGMENT_SIZE: usize = 4096;

/// A file whose contents are encrypted under the master key
pub struct EncryptedFile {
    path: PathBuf,
    master_key: MasterKey,
}

impl EncryptedFile {
    /// Bind `path` to `master_key`; nothing is opened yet
    pub fn new(path: impl Into<PathBuf>, master_key: &MasterKey) -> Self {
        Self {
            path: path.into(),
            master_key: master_key.clone(),
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file and return a writer. Fails if the file already exists.
    pub fn open_file_output(&self) -> Result<EncryptedFileWriter> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        self.output_to(file)
    }

    /// Start writing encrypted contents into an already-open, empty `file`,
    /// such as a freshly created temporary file.
    pub fn output_to(&self, file: File) -> Result<EncryptedFileWriter> {
        let salt: [u8; SALT_LEN] = random_bytes();
        let prefix: [u8; NONCE_PREFIX_LEN] = random_bytes();

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(MAGIC);
        header.push(VERSION);
        header.extend_from_slice(&salt);
        header.extend_from_slice(&prefix);

        let mut out = BufWriter::new(file);
        out.write_all(&header)?;

        Ok(EncryptedFileWriter {
            out,
            cipher: self.file_cipher(&salt)?,
            prefix,
            header,
            buffer: Zeroizing::new(Vec::with_capacity(SEGMENT_SIZE)),
            index: 0,
            finished: false,
        })
    }

    /// Decrypt and verify the whole file
    pub fn read_to_end(&self) -> Result<Zeroizing<Vec<u8>>> {
        let data = std::fs::read(&self.path)?;
        self.decrypt(&data)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(Error::Encryption("not an encrypted inventory file".to_string()));
        }
        if data[MAGIC.len()] != VERSION {
            return Err(Error::Encryption(format!(
                "unsupported encrypted file version {}",
                data[MAGIC.len()]
            )));
        }

        let (header, body) = data.split_at(HEADER_LEN);
        let salt = &header[MAGIC.len() + 1..MAGIC.len() + 1 + SALT_LEN];
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        prefix.copy_from_slice(&header[HEADER_LEN - NONCE_PREFIX_LEN..]);
        let cipher = self.file_cipher(salt)?;

        if body.is_empty() {
            return Err(Error::Encryption("encrypted file is truncated".to_string()));
        }

        let segments: Vec<&[u8]> = body.chunks(SEGMENT_SIZE + TAG_LEN).collect();
        let last_index = segments.len() - 1;
        let mut plaintext = Zeroizing::new(Vec::with_capacity(body.len()));

        for (index, segment) in segments.into_iter().enumerate() {
            let index_u32 = u32::try_from(index)
                .map_err(|_| Error::Encryption("encrypted file too large".to_string()))?;
            let nonce = segment_nonce(&prefix, index_u32, index == last_index);
            let chunk = cipher
                .decrypt(Nonce::from_slice(&nonce), Payload { msg: segment, aad: header })
                .map_err(|_| {
                    Error::Encryption(format!("segment {} failed authentication", index))
                })?;
            plaintext.extend_from_slice(&chunk);
        }

        Ok(plaintext)
    }

    fn file_cipher(&self, salt: &[u8]) -> Result<Aes256Gcm> {
        let key = self.master_key.derive_subkey(Some(salt), KEY_INFO)?;
        Aes256Gcm::new_from_slice(&key[..]).map_err(|e| Error::Encryption(e.to_string()))
    }
}

fn segment_nonce(prefix: &[u8; NONCE_PREFIX_LEN], index: u32, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_PREFIX_LEN + 4].copy_from_slice(&index.to_be_bytes());
    nonce[11] = u8::from(last);
    nonce
}

/// Writer returned by [`EncryptedFile::open_file_output`].
///
/// Call [`EncryptedFileWriter::finish`] to seal the final segment; a writer
/// dropped without it leaves a file that fails verification.
pub struct EncryptedFileWriter {
    out: BufWriter<File>,
    cipher: Aes256Gcm,
    prefix: [u8; NONCE_PREFIX_LEN],
    header: Vec<u8>,
    buffer: Zeroizing<Vec<u8>>,
    index: u32,
    finished: bool,
}

impl EncryptedFileWriter {
    fn seal_segment(&mut self, len: usize, last: bool) -> io::Result<()> {
        let nonce = segment_nonce(&self.prefix, self.index, last);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &self.buffer[..len],
                    aad: &self.header,
                },
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.out.write_all(&sealed)?;
        self.buffer.drain(..len);
        self.index = self
            .index
            .checked_add(1)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "too many segments"))?;
        Ok(())
    }

    /// Seal the final segment and flush everything to disk
    pub fn finish(mut self) -> Result<()> {
        let remaining = self.buffer.len();
        self.seal_segment(remaining, true)?;
        self.finished = true;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}

impl Write for EncryptedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(io::ErrorKind::Other, "writer already finished"));
        }
        self.buffer.extend_from_slice(buf);
        // Keep one segment buffered: it may turn out to be the last one.
        while self.buffer.len() > SEGMENT_SIZE {
            self.seal_segment(SEGMENT_SIZE, false)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(len: usize) {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let file = EncryptedFile::new(dir.path().join("data.bin"), &key);
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

        let mut writer = file.open_file_output().unwrap();
        writer.write_all(&plaintext).unwrap();
        writer.finish().unwrap();

        assert_eq!(file.read_to_end().unwrap().as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_roundtrip_segment_boundaries() {
        for len in [0, 1, SEGMENT_SIZE - 1, SEGMENT_SIZE, SEGMENT_SIZE + 1, 3 * SEGMENT_SIZE] {
            roundtrip(len);
        }
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.bin");
        std::fs::write(&path, b"keep me").unwrap();

        let file = EncryptedFile::new(&path, &MasterKey::generate());
        assert!(matches!(file.open_file_output(), Err(Error::Io(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_output_to_open_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let tmp = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        let file = EncryptedFile::new(tmp.path(), &key);

        let mut writer = file.output_to(tmp.reopen().unwrap()).unwrap();
        writer.write_all(b"bolt").unwrap();
        writer.finish().unwrap();

        assert_eq!(file.read_to_end().unwrap().as_slice(), b"bolt");
    }

    #[test]
    fn test_truncation_detected() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let path = dir.path().join("data.bin");
        let file = EncryptedFile::new(&path, &key);

        let mut writer = file.open_file_output().unwrap();
        writer.write_all(&vec![7u8; SEGMENT_SIZE * 2 + 10]).unwrap();
        writer.finish().unwrap();

        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..HEADER_LEN + SEGMENT_SIZE + TAG_LEN]).unwrap();
        assert!(file.read_to_end().is_err());
    }

    #[test]
    fn test_unfinished_writer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let file = EncryptedFile::new(dir.path().join("data.bin"), &key);

        let mut writer = file.open_file_output().unwrap();
        writer.write_all(b"partial").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert!(file.read_to_end().is_err());
    }

    #[test]
    fn test_other_key_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut writer = EncryptedFile::new(&path, &MasterKey::generate())
            .open_file_output()
            .unwrap();
        writer.write_all(b"{\"name\":\"Bolt\"}").unwrap();
        writer.finish().unwrap();

        assert!(EncryptedFile::new(&path, &MasterKey::generate())
            .read_to_end()
            .is_err());
    }
}
