use std::path::Path;

use tracing::debug;

use crate::image_pipeline::raw::types::FormatFamily;

/// Decides which format family a file belongs to.
pub trait FormatProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Option<FormatFamily>;
}

/// Probe by file extension.
pub struct ExtensionProbe {
    /// Explicit mappings; `None` uses [`FormatFamily::from_extension`].
    mappings: Option<Vec<(String, FormatFamily)>>,
}

impl ExtensionProbe {
    pub fn new(mappings: impl IntoIterator<Item = (String, FormatFamily)>) -> Self {
        Self {
            mappings: Some(
                mappings
                    .into_iter()
                    .map(|(ext, family)| (ext.to_ascii_lowercase(), family))
                    .collect(),
            ),
        }
    }

    /// Matches the common RAW extensions.
    pub fn raw_defaults() -> Self {
        Self { mappings: None }
    }
}

impl FormatProbe for ExtensionProbe {
    fn probe(&self, path: &Path) -> Option<FormatFamily> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let Some(mappings) = &self.mappings else {
            return FormatFamily::from_extension(&ext);
        };
        mappings
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, family)| *family)
    }
}

/// Ordered list of probes; the first one that recognizes a file wins.
pub struct FormatResolver {
    probes: Vec<Box<dyn FormatProbe>>,
}

impl FormatResolver {
    pub fn new(probes: Vec<Box<dyn FormatProbe>>) -> Self {
        Self { probes }
    }

    pub fn resolve(&self, path: &Path) -> Option<FormatFamily> {
        let family = self.probes.iter().find_map(|probe| probe.probe(path));
        debug!(path = %path.display(), ?family, "Resolved format");
        family
    }
}

impl Default for FormatResolver {
    fn default() -> Self {
        Self::new(vec![Box::new(ExtensionProbe::raw_defaults())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<FormatFamily>);

    impl FormatProbe for Fixed {
        fn probe(&self, _path: &Path) -> Option<FormatFamily> {
            self.0
        }
    }

    #[test]
    fn test_default_resolver() {
        let resolver = FormatResolver::default();
        assert_eq!(resolver.resolve(Path::new("/a/DSCF0001.RAF")), Some(FormatFamily::Raf));
        assert_eq!(resolver.resolve(Path::new("/a/notes.txt")), None);
        assert_eq!(resolver.resolve(Path::new("/a/no_extension")), None);
    }

    #[test]
    fn test_probe_order_matters() {
        let resolver = FormatResolver::new(vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some(FormatFamily::Dng))),
            Box::new(Fixed(Some(FormatFamily::Nef))),
        ]);
        assert_eq!(resolver.resolve(Path::new("x.raf")), Some(FormatFamily::Dng));
    }

    #[test]
    fn test_custom_extension_mapping() {
        let probe = ExtensionProbe::new([("RWL".to_string(), FormatFamily::Rw2)]);
        assert_eq!(probe.probe(Path::new("x.rwl")), Some(FormatFamily::Rw2));
        assert_eq!(probe.probe(Path::new("x.raf")), None);
    }
}
