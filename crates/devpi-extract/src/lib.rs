use std::borrow::Cow;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub use error::Error;

mod error;

static CONTROL_CHARACTERS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{C}").unwrap());
static REPLACEMENT_CHARACTER: &str = "\u{FFFD}";

/// Unzip a `.zip` archive into the target directory.
///
/// Directories are created as needed and existing files are overwritten. Returns the number of
/// files written.
pub fn unzip<R: Read + Seek>(reader: R, target: &Path) -> Result<usize, Error> {
    let mut archive = ZipArchive::new(reader)?;
    let mut directories = FxHashSet::default();
    let mut files = 0;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        validate_archive_member_name(file.name())?;

        // Determine the path of the file within the archive.
        let Some(relative) = file.enclosed_name() else {
            return Err(Error::UnsafePath(file.name().to_string()));
        };
        let path = target.join(relative);

        if file.is_dir() {
            if directories.insert(path.clone()) {
                fs_err::create_dir_all(&path)?;
            }
            continue;
        }

        if let Some(parent) = path.parent() {
            if directories.insert(parent.to_path_buf()) {
                fs_err::create_dir_all(parent)?;
            }
        }

        let mut outfile = fs_err::File::create(&path)?;
        std::io::copy(&mut file, &mut outfile)?;
        files += 1;

        // The executable bit is the only permission we preserve, otherwise we use the OS defaults.
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = file.unix_mode() {
                if mode & 0o111 != 0 {
                    let permissions = fs_err::metadata(&path)?.permissions();
                    fs_err::set_permissions(
                        &path,
                        Permissions::from_mode(permissions.mode() | 0o111),
                    )?;
                }
            }
        }
    }

    Ok(files)
}

/// Unzip the archive at `source` into the target directory.
///
/// The archive is read as a `.zip` regardless of its file extension.
pub fn unzip_file(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<usize, Error> {
    let source = source.as_ref();
    let target = target.as_ref();
    debug!(
        "Unzipping `{}` into `{}`",
        source.display(),
        target.display()
    );
    let file = fs_err::File::open(source)?;
    let files = unzip(std::io::BufReader::new(file), target)?;
    debug!("Extracted {files} files from `{}`", source.display());
    Ok(files)
}

/// Zip the contents of the `source` directory into a new archive at `target`.
///
/// Members are stored relative to `source`, in sorted order, so the same tree always produces
/// the same member list. Empty directories are kept. Returns the number of files written.
pub fn zip_dir(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<usize, Error> {
    let source = source.as_ref();
    let target = target.as_ref();
    debug!("Zipping `{}` into `{}`", source.display(), target.display());

    let mut writer = ZipWriter::new(fs_err::File::create(target)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let name = member_name(source, entry.path())?;
        validate_archive_member_name(&name)?;

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            continue;
        }
        if !entry.file_type().is_file() {
            trace!("Skipping `{}`", entry.path().display());
            continue;
        }

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            options.unix_permissions(entry.metadata()?.permissions().mode())
        };

        writer.start_file(name, options)?;
        let mut file = fs_err::File::open(entry.path())?;
        std::io::copy(&mut file, &mut writer)?;
        files += 1;
    }

    writer.finish()?;
    debug!("Wrote {files} files to `{}`", target.display());
    Ok(files)
}

/// The `/`-separated archive member name of `path`, relative to `root`.
fn member_name(root: &Path, path: &Path) -> Result<String, Error> {
    let lossy = || path.to_string_lossy().to_string();
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::UnsafePath(lossy()))?;
    let components = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::UnacceptableFilename { filename: lossy() })?;
    Ok(components.join("/"))
}

/// Validate that a given member name is one we are willing to write to disk.
///
/// Rejects names that are empty or contain *any* non-printable characters.
pub(crate) fn validate_archive_member_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::EmptyFilename);
    }

    match CONTROL_CHARACTERS_RE.replace_all(name, REPLACEMENT_CHARACTER) {
        // No replacements mean no control characters.
        Cow::Borrowed(_) => Ok(()),
        Cow::Owned(sanitized) => Err(Error::UnacceptableFilename {
            filename: sanitized,
        }),
    }
}
