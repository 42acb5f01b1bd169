//! region → machine image table
use crate::value::{Object, Value};
use indexmap::IndexMap;

/// Logical name of the emitted mapping
pub const MAPPING_NAME: &str = "AWSAMIRegionMap";

// AMI list generated by:
// make AMI_ID=ami-07bb5101b6910f67d ami-ec2-copy
// on Mon Mar 14 19:44:16 UTC 2022.
const AMI_NAME: &str = "test";
const GENERATED_AMI_IDS: &[(&str, &str)] = &[("us-east-1", "ami-07bb5101b6910f67d")];
// End generated code block.

/// Read-only lookup from region to image id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiRegionMap {
    name: String,
    images: IndexMap<String, String>,
}

impl AmiRegionMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            images: Default::default(),
        }
    }

    /// The table produced by the image copy job
    pub fn generated() -> Self {
        GENERATED_AMI_IDS
            .iter()
            .fold(Self::new(AMI_NAME), |map, (region, image)| {
                map.with_image(*region, *image)
            })
    }

    pub fn with_image(mut self, region: impl Into<String>, image: impl Into<String>) -> Self {
        self.images.insert(region.into(), image.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn image_for(&self, region: &str) -> Result<&str, MappingError> {
        self.images
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| MappingError::MissingRegion {
                region: region.to_string(),
                known: self.images.keys().cloned().collect(),
            })
    }

    /// Mapping section entry
    ///
    /// `{"AMI": {"OEZULIP": <name>}, <region>: {"AMI": <image>}, ...}`
    pub fn to_mapping(&self) -> Value {
        let mut mapping = Object::new();
        mapping.insert("AMI".into(), crate::object! { "OEZULIP" => self.name.as_str() });
        for (region, image) in &self.images {
            mapping.insert(region.clone(), crate::object! { "AMI" => image.as_str() });
        }
        Value::Object(mapping)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MappingError {
    #[error("No machine image for region {region} (known regions: {known:?})")]
    MissingRegion { region: String, known: Vec<String> },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup() {
        let map = AmiRegionMap::new("zulip-8")
            .with_image("us-east-1", "ami-1")
            .with_image("eu-west-1", "ami-2");

        assert_eq!(map.image_for("eu-west-1"), Ok("ami-2"));
        assert_eq!(
            map.image_for("ap-south-1"),
            Err(MappingError::MissingRegion {
                region: "ap-south-1".into(),
                known: vec!["us-east-1".into(), "eu-west-1".into()],
            })
        );
    }

    #[test]
    fn generated_table_is_not_empty() {
        let map = AmiRegionMap::generated();
        assert!(map.regions().count() > 0);
        for region in map.regions() {
            assert!(map.image_for(region).is_ok());
        }
    }

    #[test]
    fn mapping_keeps_region_order() {
        let map = AmiRegionMap::new("zulip-8")
            .with_image("us-west-2", "ami-b")
            .with_image("us-east-1", "ami-a");

        assert_eq!(
            serde_json::to_string(&map.to_mapping()).unwrap(),
            r#"{"AMI":{"OEZULIP":"zulip-8"},"us-west-2":{"AMI":"ami-b"},"us-east-1":{"AMI":"ami-a"}}"#
        );
    }
}
