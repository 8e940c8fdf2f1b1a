use super::error::Error;
use super::Result;
use reqwest::Certificate;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Cluster CA bundle materialized on disk. The file is removed when the value is dropped.
#[derive(Debug)]
pub struct CaFile {
    file: NamedTempFile,
}

impl CaFile {
    pub fn write(pem: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("eks-ca-")
            .suffix(".pem")
            .tempfile()?;
        file.write_all(pem)?;
        file.flush()?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        let pem = std::fs::read(self.path())?;
        let certificates = Certificate::from_pem_bundle(&pem)
            .map_err(|e| Error::InvalidCertificate(Some(e)))?;

        if certificates.is_empty() {
            return Err(Error::InvalidCertificate(None));
        }

        Ok(certificates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::tests::CA_PEM;

    #[test]
    fn test_file_removed_on_drop() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let ca_file = CaFile::write(CA_PEM.as_bytes())?;
        let path = ca_file.path().to_path_buf();

        assert_eq!(CA_PEM, std::fs::read_to_string(&path)?);
        assert_eq!(1, ca_file.certificates()?.len());

        drop(ca_file);
        assert!(!path.exists());

        Ok(())
    }

    #[test]
    fn test_file_removed_after_invalid_certificate(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = {
            let ca_file = CaFile::write(b"garbage")?;
            assert!(matches!(
                ca_file.certificates(),
                Err(Error::InvalidCertificate(_))
            ));
            ca_file.path().to_path_buf()
        };

        assert!(!path.exists());

        Ok(())
    }

    #[test]
    fn test_concurrent_files_do_not_collide() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let first = CaFile::write(CA_PEM.as_bytes())?;
        let second = CaFile::write(CA_PEM.as_bytes())?;

        assert_ne!(first.path(), second.path());

        Ok(())
    }
}
