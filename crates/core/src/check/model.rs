use std::collections::BTreeMap;

use roxmltree::Document;
use serde::{Deserialize, Serialize};

use super::xml::{child, child_path, element_text, escape, find_anywhere};
use super::CheckError;

/// A check definition as exchanged with the daemon.
///
/// `config` holds the module-specific block as element name to text. Keys
/// must be valid XML element names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Present when read back from the daemon; never sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    pub module: String,
    pub target: String,
    /// Run interval in milliseconds.
    pub period: u64,
    /// Per-run timeout in milliseconds.
    pub timeout: u64,
    pub filterset: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Check {
    /// Serialize to the request document accepted by `set` and `test`.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        xml.push_str("<check><attributes>");
        push_element(&mut xml, "name", &self.name);
        push_element(&mut xml, "module", &self.module);
        push_element(&mut xml, "target", &self.target);
        push_element(&mut xml, "period", &self.period.to_string());
        push_element(&mut xml, "timeout", &self.timeout.to_string());
        push_element(&mut xml, "filterset", &self.filterset);
        xml.push_str("</attributes>");

        if self.config.is_empty() {
            xml.push_str("<config/>");
        } else {
            xml.push_str("<config>");
            for (key, value) in &self.config {
                push_element(&mut xml, key, value);
            }
            xml.push_str("</config>");
        }

        xml.push_str("</check>");
        xml
    }

    /// Decode a check document, either bare or nested in a daemon reply.
    pub fn from_xml(xml: &str) -> Result<Self, CheckError> {
        let doc = Document::parse(xml)?;
        let attributes = find_anywhere(&doc, &["check", "attributes"])
            .ok_or(CheckError::MissingElement("check/attributes"))?;
        let check = attributes.parent().ok_or(CheckError::MissingElement("check"))?;

        let text = |name: &'static str| -> Result<String, CheckError> {
            child(attributes, name)
                .map(element_text)
                .ok_or(CheckError::MissingElement(name))
        };
        let number = |name: &'static str| -> Result<u64, CheckError> {
            let value = text(name)?;
            value
                .parse()
                .map_err(|_| CheckError::InvalidValue { field: name, value })
        };

        let uuid = child(attributes, "uuid")
            .map(element_text)
            .or_else(|| check.attribute("uuid").map(str::to_string))
            .filter(|u| !u.is_empty());

        let config = child_path(check, &["config"])
            .map(|node| {
                node.children()
                    .filter(|c| c.is_element())
                    .map(|c| (c.tag_name().name().to_string(), element_text(c)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            uuid,
            name: text("name")?,
            module: text("module")?,
            target: text("target")?,
            period: number("period")?,
            timeout: number("timeout")?,
            filterset: text("filterset")?,
            config,
        })
    }
}

fn push_element(xml: &mut String, name: &str, value: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::VERSION_CHECK;

    fn http_check() -> Check {
        let mut config = BTreeMap::new();
        config.insert("code".to_string(), "200".to_string());
        config.insert("url".to_string(), "https://labs.omniti.com/?a=1&b=2".to_string());

        Check {
            uuid: None,
            name: "test".to_string(),
            module: "http".to_string(),
            target: "127.0.0.1".to_string(),
            period: 60001,
            timeout: 5000,
            filterset: "default".to_string(),
            config,
        }
    }

    #[test]
    fn test_to_xml_escapes_values() {
        let xml = http_check().to_xml();
        assert!(xml.contains("<period>60001</period>"));
        assert!(xml.contains("<url>https://labs.omniti.com/?a=1&amp;b=2</url>"));
        assert!(!xml.contains("<uuid>"));
    }

    #[test]
    fn test_from_xml_reads_daemon_reply() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<check>
  <attributes>
    <uuid>edc4760b-5bdb-45d6-ab82-34160eda8187</uuid>
    <name>test</name>
    <module>selfcheck</module>
    <target>127.0.0.1</target>
    <period>60001</period>
    <timeout>5000</timeout>
    <filterset>default</filterset>
  </attributes>
  <config>
    <code>200</code>
  </config>
  <state><state>good</state></state>
</check>"#;

        let check = Check::from_xml(xml).unwrap();
        assert_eq!(
            check.uuid.as_deref(),
            Some("edc4760b-5bdb-45d6-ab82-34160eda8187")
        );
        assert_eq!(check.module, "selfcheck");
        assert_eq!(check.period, 60001);
        assert_eq!(check.config.get("code").map(String::as_str), Some("200"));
    }

    #[test]
    fn test_from_xml_decodes_what_to_xml_wrote() {
        let original = http_check();
        let decoded = Check::from_xml(&original.to_xml()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_version_check_decodes() {
        let check = Check::from_xml(VERSION_CHECK).unwrap();
        assert_eq!(check.module, "selfcheck");
        assert_eq!(check.target, "50.0.0.0");
        assert_eq!(check.timeout, 5000);
        assert!(check.config.is_empty());
    }

    #[test]
    fn test_from_xml_rejects_bad_period() {
        let xml = "<check><attributes><name>n</name><module>m</module><target>t</target>\
                   <period>often</period><timeout>1</timeout><filterset>f</filterset>\
                   </attributes></check>";
        let err = Check::from_xml(xml).unwrap_err();
        assert!(matches!(err, CheckError::InvalidValue { field: "period", .. }));
    }

    #[test]
    fn test_from_xml_requires_attributes() {
        let err = Check::from_xml("<check/>").unwrap_err();
        assert!(matches!(err, CheckError::MissingElement(_)));
    }
}
