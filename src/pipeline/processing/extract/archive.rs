use std::io::{Cursor, Read};

use image::GenericImageView;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::{stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const ZIP_TAG: &str = "ZIP_Archive";

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "svg", "webp", "gif"];

/// Fitness-for-use tier of an image, by megapixel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suitability {
    ProfessionalPrint,
    AiTrainingHd,
    StandardWeb,
    LowQuality,
    Unusable,
}

impl Suitability {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let megapixels = (width as f64 * height as f64) / 1_000_000.0;
        if megapixels >= 3.0 {
            Suitability::ProfessionalPrint
        } else if megapixels >= 0.5 {
            Suitability::AiTrainingHd
        } else if megapixels >= 0.1 {
            Suitability::StandardWeb
        } else {
            Suitability::LowQuality
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Suitability::ProfessionalPrint => "Professional Print",
            Suitability::AiTrainingHd => "AI Training / HD",
            Suitability::StandardWeb => "Standard Web",
            Suitability::LowQuality => "Low Quality",
            Suitability::Unusable => "Unusable",
        }
    }

    /// Entry status implied by the tier
    pub fn status(&self) -> &'static str {
        match self {
            Suitability::LowQuality => "Warning (Low Res)",
            Suitability::Unusable => "Corrupted/Invalid",
            _ => "Healthy",
        }
    }
}

/// One record per file entry describing its health. Directories and
/// resource-fork entries are skipped. An entry whose data cannot be opened
/// is reported as corrupted; the rest of the archive is still scanned.
pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let mut archive = ZipArchive::new(Cursor::new(artifact.payload.as_slice()))?;
    let mut records = Vec::new();

    for index in 0..archive.len() {
        let listed = archive
            .name_for_index(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("entry_{index}"));
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                if !is_skipped(&listed) {
                    warn!(entry = %listed, error = %e, "ZIP entry unreadable");
                    records.push(unreadable_entry(&listed));
                }
                continue;
            }
        };
        let name = entry.name().to_string();
        if entry.is_dir() || is_skipped(&name) {
            continue;
        }

        let extension = extension_of(&name);
        let size_kb = (entry.size() as f64 / 1024.0 * 100.0).round() / 100.0;

        let mut record = Record::new();
        record.insert("filename", name.as_str());
        record.insert("extension", extension.as_str());
        record.insert("size_kb", size_kb);

        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            let mut data = Vec::new();
            let dimensions = entry
                .read_to_end(&mut data)
                .ok()
                .and_then(|_| image::load_from_memory(&data).ok())
                .map(|img| img.dimensions());
            let suitability = match dimensions {
                Some((w, h)) => Suitability::from_dimensions(w, h),
                None => {
                    debug!(entry = %name, "Image entry could not be decoded");
                    Suitability::Unusable
                }
            };
            record.insert("status", suitability.status());
            record.insert("multimedia_type", "Image");
            record.insert(
                "resolution",
                dimensions.map_or_else(|| "—".to_string(), |(w, h)| format!("{w}x{h}")),
            );
            record.insert("suitability", suitability.label());
        } else {
            record.insert("status", "Healthy");
            record.insert("multimedia_type", "Other");
            record.insert("resolution", "—");
            record.insert("suitability", "N/A (Non-Image)");
        }
        records.push(record);
    }

    info!(entries = records.len(), "ZIP scan complete");
    Ok(stamp_all(records, ZIP_TAG, artifact))
}

fn is_skipped(name: &str) -> bool {
    name.ends_with('/') || name.contains("__MACOSX") || name.starts_with("._")
}

fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Record for an entry listed in the central directory whose data cannot
/// be opened
fn unreadable_entry(name: &str) -> Record {
    let extension = extension_of(name);
    let is_image = IMAGE_EXTENSIONS.contains(&extension.as_str());
    let mut record = Record::new();
    record.insert("filename", name);
    record.insert("extension", extension.as_str());
    record.insert("size_kb", Cell::Null);
    record.insert("status", Suitability::Unusable.status());
    record.insert("multimedia_type", if is_image { "Image" } else { "Other" });
    record.insert("resolution", "—");
    record.insert(
        "suitability",
        if is_image {
            Suitability::Unusable.label()
        } else {
            "N/A (Non-Image)"
        },
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megapixel_tiers() {
        assert_eq!(Suitability::from_dimensions(2048, 1536), Suitability::ProfessionalPrint);
        assert_eq!(Suitability::from_dimensions(1000, 500), Suitability::AiTrainingHd);
        assert_eq!(Suitability::from_dimensions(400, 250), Suitability::StandardWeb);
        assert_eq!(Suitability::from_dimensions(100, 100), Suitability::LowQuality);
        assert_eq!(Suitability::LowQuality.status(), "Warning (Low Res)");
    }

    #[test]
    fn non_zip_payload_fails() {
        let artifact = RawArtifact::new(crate::domain::SourceKind::ZipArchive, b"nope".to_vec(), None);
        assert!(extract(&artifact, &ExtractContext::default()).is_err());
    }
}
