// ── Reservation file I/O ──
//
// TOML array of `[[reservation]]` tables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::Reservation;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReservationFile {
    #[serde(default, rename = "reservation")]
    reservations: Vec<Reservation>,
}

fn persistence_error(path: &Path, reason: impl ToString) -> CoreError {
    CoreError::PersistenceError {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read the table. A missing or blank file is an empty table.
pub(crate) fn read(path: &Path) -> Result<Vec<Reservation>, CoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(persistence_error(path, e)),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: ReservationFile =
        toml::from_str(&raw).map_err(|e| persistence_error(path, format!("invalid reservation file: {e}")))?;
    Ok(file.reservations)
}

pub(crate) fn render(reservations: &[Reservation]) -> Result<String, CoreError> {
    let file = ReservationFile {
        reservations: reservations.to_vec(),
    };
    let body = toml::to_string_pretty(&file)
        .map_err(|e| CoreError::Internal(format!("serialize reservations: {e}")))?;
    Ok(format!("# Managed by pixelpi. A running daemon reloads hand edits on SIGHUP.\n\n{body}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::write_atomic;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    #[test]
    fn missing_and_blank_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reservations.toml");
        assert!(read(&path).unwrap().is_empty());
        std::fs::write(&path, "\n  \n").unwrap();
        assert!(read(&path).unwrap().is_empty());
    }

    #[test]
    fn partial_entries_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reservations.toml");
        std::fs::write(
            &path,
            "[[reservation]]\nhardware_address = \"AA-BB-CC-DD-EE-FF\"\naddress = \"10.0.1.50\"\n",
        )
        .unwrap();
        let entries = read(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hardware_address.as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(entries[0].label, "");
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reservations.toml");
        let entries = vec![Reservation {
            hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            address: Ipv4Addr::new(10, 0, 1, 50),
            label: "Controller-1".into(),
            created_at: Utc::now(),
        }];
        write_atomic(&path, &render(&entries).unwrap()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.lines().next().unwrap().contains("SIGHUP"), "{raw}");
        let back = read(&path).unwrap();
        assert_eq!(back[0].label, "Controller-1");
        assert_eq!(back[0].address, Ipv4Addr::new(10, 0, 1, 50));
        // no temporary files left next to the table
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn garbage_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reservations.toml");
        std::fs::write(&path, "[[reservation]\nnot toml").unwrap();
        assert_eq!(read(&path).unwrap_err().kind(), "persistence_error");
    }
}
