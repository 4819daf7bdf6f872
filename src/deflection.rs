use serde::Deserialize;
use serde_xml_rs::from_reader;

use crate::error::{Error, Result};

// response of X_AVM-DE_OnTel:1 GetDeflections (NewDeflectionList)

#[derive(Debug, Deserialize)]
struct DeflectionList {
    #[serde(rename = "Item", default)]
    items: Vec<Deflection>,
}

/// A call deflection rule as configured on the router.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Deflection {
    #[serde(rename = "DeflectionId")]
    pub id: u32,
    #[serde(rename = "Enable")]
    pub enable: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Number", default)]
    pub number: String,
    #[serde(rename = "DeflectionToNumber", default)]
    pub deflection_to_number: String,
    #[serde(rename = "Mode", default)]
    pub mode: String,
}

impl Deflection {
    pub fn is_enabled(&self) -> bool {
        self.enable.trim() == "1"
    }
}

/// Parses the deflection list the router returns as an XML string.
pub fn parse_deflections(xml: &str) -> Result<Vec<Deflection>> {
    from_reader::<&[u8], DeflectionList>(xml.as_bytes())
        .map(|list| list.items)
        .map_err(|err| Error::Protocol(format!("cannot parse deflection list: {err}")))
}
