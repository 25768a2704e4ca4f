//! Initramfs archives: implements `InitrdPreparer`.
//!
//! Writes SVR4 `newc` cpio archives: a 110-byte ASCII header per entry,
//! NUL-terminated name and data each padded to 4 bytes, closed by a
//! `TRAILER!!!` entry.

use std::fs::File;
use std::io::{self, BufWriter, Read as _, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::application::ports::{Initrd, InitrdPreparer};

pub const NEWC_FORMAT: &str = "newc";
pub const ARCHIVE_NAME: &str = "initramfs.cpio";

const MAGIC: &str = "070701";
const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Builds `newc` archives from host paths.
pub struct CpioArchiver;

impl InitrdPreparer for CpioArchiver {
    fn prepare(&self, workdir: &Path, output_dir: &Path, descriptor: &str) -> Result<Initrd> {
        let output = output_dir.join(ARCHIVE_NAME);

        if let Some((host, guest)) = descriptor.split_once(':') {
            let host = resolve(workdir, host);
            archive(&host, guest, &output)?;
            return Ok(Initrd {
                path: output,
                format: NEWC_FORMAT.to_string(),
            });
        }

        let path = resolve(workdir, descriptor);
        let meta = std::fs::metadata(&path)
            .with_context(|| format!("initrd {} does not exist", path.display()))?;
        if meta.is_dir() {
            archive(&path, "/", &output)?;
            Ok(Initrd {
                path: output,
                format: NEWC_FORMAT.to_string(),
            })
        } else {
            tracing::debug!(path = %path.display(), "using prebuilt initrd");
            Ok(Initrd {
                path,
                format: NEWC_FORMAT.to_string(),
            })
        }
    }
}

fn resolve(workdir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

/// Archive `host` at `guest` inside a new archive at `output`.
///
/// # Errors
///
/// Returns an error if `host` cannot be walked or `output` cannot be written.
pub fn archive(host: &Path, guest: &str, output: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(host)
        .with_context(|| format!("cannot read {}", host.display()))?;
    let guest = guest.trim_matches('/');

    let file = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    let mut writer = CpioWriter::new(BufWriter::new(file));

    // Parent directories of the guest path come first.
    let mut prefix = String::new();
    let parents: Vec<&str> = guest.split('/').filter(|c| !c.is_empty()).collect();
    let dir_count = if meta.is_dir() { parents.len() } else { parents.len().saturating_sub(1) };
    for component in &parents[..dir_count] {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(component);
        writer.directory(&prefix, 0o755, 0)?;
    }

    if meta.is_dir() {
        for entry in WalkDir::new(host).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("cannot walk {}", host.display()))?;
            let relative = entry
                .path()
                .strip_prefix(host)
                .with_context(|| format!("{} escapes {}", entry.path().display(), host.display()))?;
            let name = join_guest(guest, &relative.to_string_lossy());
            writer.entry(entry.path(), &name)?;
        }
    } else {
        writer.entry(host, guest)?;
    }

    writer.finish()?;
    tracing::debug!(
        host = %host.display(),
        guest = %guest,
        output = %output.display(),
        "wrote initramfs"
    );
    Ok(())
}

fn join_guest(guest: &str, relative: &str) -> String {
    if guest.is_empty() {
        relative.to_string()
    } else {
        format!("{guest}/{relative}")
    }
}

struct CpioWriter<W: Write> {
    out: W,
    ino: u32,
}

impl<W: Write> CpioWriter<W> {
    fn new(out: W) -> Self {
        Self { out, ino: 0 }
    }

    fn entry(&mut self, path: &Path, name: &str) -> Result<()> {
        let meta = std::fs::symlink_metadata(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mtime = mtime(&meta);
        let perm = permissions(&meta);

        if meta.is_dir() {
            self.directory(name, perm, mtime)
        } else if meta.file_type().is_symlink() {
            let target = std::fs::read_link(path)
                .with_context(|| format!("cannot read link {}", path.display()))?;
            let target = target.to_string_lossy();
            self.record(name, S_IFLNK | 0o777, mtime, target.as_bytes())
        } else {
            self.file(path, name, perm, mtime, meta.len())
        }
    }

    /// Stream a regular file of `len` bytes into the archive.
    fn file(&mut self, path: &Path, name: &str, perm: u32, mtime: u32, len: u64) -> Result<()> {
        let size = u32::try_from(len)
            .with_context(|| format!("{name} is too large for a newc archive"))?;
        let file = File::open(path).with_context(|| format!("cannot read {}", path.display()))?;

        self.ino += 1;
        self.header(self.ino, S_IFREG | perm, 1, mtime, size, name)?;
        let copied = io::copy(&mut file.take(len), &mut self.out)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if copied != len {
            anyhow::bail!("{} changed size while archiving", path.display());
        }
        self.pad(usize::try_from(size)?)?;
        Ok(())
    }

    fn directory(&mut self, name: &str, perm: u32, mtime: u32) -> Result<()> {
        self.record(name, S_IFDIR | perm, mtime, &[])
    }

    fn record(&mut self, name: &str, mode: u32, mtime: u32, data: &[u8]) -> Result<()> {
        self.ino += 1;
        let nlink = if mode & S_IFMT == S_IFDIR { 2 } else { 1 };
        let size = u32::try_from(data.len())
            .with_context(|| format!("{name} is too large for a newc archive"))?;
        self.header(self.ino, mode, nlink, mtime, size, name)?;
        self.out.write_all(data)?;
        self.pad(data.len())?;
        Ok(())
    }

    fn header(
        &mut self,
        ino: u32,
        mode: u32,
        nlink: u32,
        mtime: u32,
        size: u32,
        name: &str,
    ) -> Result<()> {
        let namesize = u32::try_from(name.len() + 1).context("entry name too long")?;
        write!(
            self.out,
            "{MAGIC}{ino:08x}{mode:08x}{uid:08x}{gid:08x}{nlink:08x}{mtime:08x}{size:08x}\
             {dev:08x}{dev:08x}{dev:08x}{dev:08x}{namesize:08x}{check:08x}",
            uid = 0,
            gid = 0,
            dev = 0,
            check = 0,
        )?;
        self.out.write_all(name.as_bytes())?;
        self.out.write_all(&[0])?;
        self.pad(110 + name.len() + 1)?;
        Ok(())
    }

    fn pad(&mut self, written: usize) -> Result<()> {
        let padding = (4 - written % 4) % 4;
        self.out.write_all(&[0u8; 3][..padding])?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.header(0, 0, 1, 0, 0, TRAILER)?;
        self.out.flush()?;
        Ok(())
    }
}

fn mtime(meta: &std::fs::Metadata) -> u32 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() { 0o755 } else { 0o644 }
}
