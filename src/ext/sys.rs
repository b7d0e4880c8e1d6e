use std::{
    io::{self, BufWriter, Read, Write},
    fs::{self, File},
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::add_path,
};

/// Finds an executable, and returns Error, if executable is not available.
pub fn find_exe(p: impl AsRef<Path>) -> Result<PathBuf, Error> {
    which::which(p.as_ref()).map_err(|_| Error::NoExec(p.as_ref().to_owned()))
}

/// Create directory together with all parents, if it does not exist yet.
pub fn mkdir(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(add_path!(path))
    } else {
        Ok(())
    }
}

/// Creates buffered file.
pub fn create_file(filename: &Path) -> Result<BufWriter<File>, Error> {
    File::create(filename).map_err(add_path!(filename)).map(BufWriter::new)
}

/// Writes lines to the file, one entry per line.
pub fn write_lines<S: AsRef<str>>(filename: &Path, lines: impl IntoIterator<Item = S>) -> Result<(), Error> {
    let mut f = create_file(filename)?;
    for line in lines {
        writeln!(f, "{}", line.as_ref()).map_err(add_path!(filename))?;
    }
    f.flush().map_err(add_path!(filename))
}

/// Loads full JSON contents from a file.
pub fn load_json(filename: &Path) -> Result<json::JsonValue, Error> {
    let mut s = String::new();
    File::open(filename).and_then(|mut f| f.read_to_string(&mut s)).map_err(add_path!(filename))?;
    json::parse(&s).map_err(Error::from)
}

/// Removes file or directory, if it exists.
/// Returns true if anything was removed.
pub fn remove_any(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map(|_| true),
        Ok(_) => fs::remove_file(path).map(|_| true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Moves file into the directory, keeping its name.
/// Does nothing if the file already has the same name in the target directory.
pub fn move_into(path: &Path, dir: &Path) -> Result<PathBuf, Error> {
    let name = path.file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Cannot move {}: no file name", super::fmt::path(path))))?;
    let target = dir.join(name);
    if target != path {
        fs::rename(path, &target).map_err(add_path!(path, target))?;
    }
    Ok(target)
}

/// Returns all paths that match glob pattern `dir/pattern`, sorted.
pub fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let dir_str = dir.to_str()
        .ok_or_else(|| Error::InvalidInput(format!("Path {} is not a valid UTF-8", super::fmt::path(dir))))?;
    let full = Path::new(&glob::Pattern::escape(dir_str)).join(pattern);
    let full_str = full.to_str()
        .ok_or_else(|| Error::InvalidInput(format!("Path {} is not a valid UTF-8", super::fmt::path(&full))))?;
    let mut res: Vec<PathBuf> = glob::glob(full_str)
        .map_err(|e| Error::InvalidInput(format!("Invalid glob pattern {:?}: {}", full_str, e)))?
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Cannot access {}: {}", super::fmt::path(e.path()), e.error());
                None
            }
        })
        .collect();
    res.sort();
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_and_move() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("a.txt"), "a").unwrap();
        mkdir(dir.join("sub/inner")).unwrap();
        fs::write(dir.join("sub/inner/b.txt"), "b").unwrap();

        assert!(remove_any(&dir.join("sub")).unwrap());
        assert!(!dir.join("sub").exists());
        assert!(!remove_any(&dir.join("sub")).unwrap());

        mkdir(dir.join("stash")).unwrap();
        let moved = move_into(&dir.join("a.txt"), &dir.join("stash")).unwrap();
        assert_eq!(moved, dir.join("stash/a.txt"));
        assert_eq!(glob_in(dir, "stash/*.txt").unwrap(), vec![moved]);
    }
}
