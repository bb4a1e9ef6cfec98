use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::KiraError;

/// Extracts the named top-level members of `zip_path` into `target_dir`.
/// Members are matched on their file name, so archives that nest the dump in a
/// directory still work.
pub fn extract_members(
    zip_path: &Path,
    target_dir: &Path,
    members: &[&str],
) -> Result<(), KiraError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    fs::create_dir_all(target_dir).map_err(|err| KiraError::Filesystem(err.to_string()))?;

    let mut remaining = members.to_vec();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(entry_path) = entry.enclosed_name() else {
            return Err(KiraError::Filesystem(
                "zip entry path traversal detected".to_string(),
            ));
        };
        let Some(name) = entry_path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(pos) = remaining.iter().position(|member| *member == name) else {
            continue;
        };
        let member = remaining.swap_remove(pos);

        let mut outfile = fs::File::create(target_dir.join(member))
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }

    match remaining.first() {
        Some(missing) => Err(KiraError::IncompleteTaxdump(missing.to_string())),
        None => Ok(()),
    }
}

/// Reads every entry once to verify checksums and returns the entry names.
pub fn validate_zip(zip_path: &Path) -> Result<Vec<String>, KiraError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| KiraError::Filesystem(err.to_string()))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        names.push(entry.name().to_string());
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    Ok(names)
}
