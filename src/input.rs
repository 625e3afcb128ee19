//! Command-file and device-list loading.

use std::fs;
use std::path::Path;

use crate::error::InputError;

/// Read a command file: one command per line, trailing whitespace
/// stripped. Blank lines are preserved as empty commands (they send a
/// bare newline to the device).
pub fn read_command_file(path: &Path) -> Result<Vec<String>, InputError> {
    Ok(read(path)?
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect())
}

/// Read a device list: one device address per line, trailing whitespace
/// stripped, blank lines skipped.
pub fn read_device_list(path: &Path) -> Result<Vec<String>, InputError> {
    Ok(read(path)?
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn read(path: &Path) -> Result<String, InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| InputError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn commands_preserve_blank_lines() {
        let file = temp_with("set x 1  \n\nset y 2\n");
        let commands = read_command_file(file.path()).unwrap();
        assert_eq!(commands, vec!["set x 1", "", "set y 2"]);
    }

    #[test]
    fn device_list_skips_blank_lines() {
        let file = temp_with("router1\n\nrouter2   \n");
        let devices = read_device_list(file.path()).unwrap();
        assert_eq!(devices, vec!["router1", "router2"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_command_file(Path::new("/no/such/file")).unwrap_err();
        assert!(matches!(err, InputError::MissingFile { .. }));
    }
}
