use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::port::PortRecord;

/// Write all port records to a gzip-compressed bincode snapshot.
///
/// The snapshot is written next to `path` and renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
pub fn save_ports(ports: &[PortRecord], path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);

        serialize_into(&mut writer, ports)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .finish()?;
    }
    fs::rename(&tmp, path)
}

pub fn load_ports(path: &Path) -> std::io::Result<Vec<PortRecord>> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let ports: Vec<PortRecord> = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{AgentRecord, ContainerCounts};

    #[test]
    fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.bin.gz");

        let mut chennai = PortRecord::new("chennai");
        chennai.replace_agent(AgentRecord::new(
            "GOODRICH",
            ContainerCounts {
                gp20: 31,
                hc40: 28,
                ..Default::default()
            },
        ));
        let ports = vec![chennai, PortRecord::new("KOLKATA")];

        save_ports(&ports, &path).unwrap();
        let loaded = load_ports(&path).unwrap();

        assert_eq!(loaded, ports);
        assert!(!path.with_extension("tmp").exists());
    }
}
