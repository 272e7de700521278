use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes through a sibling `.partial` file so readers never observe a
/// half-written level or descriptor.
pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path_for(path);
    fs::write(&partial, bytes)?;
    swap_into_place(&partial, path)
}

pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    write_bytes_atomic(path, text.as_bytes())
}

fn swap_into_place(partial: &Path, target: &Path) -> io::Result<()> {
    // Windows refuses to rename over an existing file.
    if let Err(error) = fs::remove_file(target) {
        if error.kind() != io::ErrorKind::NotFound {
            let _ = fs::remove_file(partial);
            return Err(error);
        }
    }

    fs::rename(partial, target).inspect_err(|_| {
        let _ = fs::remove_file(partial);
    })
}

fn partial_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tilemap.out");
    path.with_file_name(format!("{file_name}.partial"))
}
