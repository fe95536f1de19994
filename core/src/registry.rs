//! External topology registry (OIM): fetch and parse the resource-group
//! summary XML.
//!
//! The fetch is not retried here. A failed fetch surfaces as
//! `ReportError::Registry` and the caller decides whether to rerun.

use crate::error::ReportResult;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use serde::Serialize;
use std::time::Duration;

/// One `<Resource>` element, with its enclosing `<GroupName>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryResource {
    pub group_name: Option<String>,
    pub fqdn: Option<String>,
    pub name: Option<String>,
    pub hidden: bool,
}

/// Anything that can produce the registry summary document.
pub trait RegistrySource {
    fn fetch_xml(&self) -> ReportResult<String>;
}

/// Blocking HTTP fetch of a registry summary URL.
pub struct HttpRegistry {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpRegistry {
    pub fn new(url: &str, timeout_secs: u64) -> ReportResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl RegistrySource for HttpRegistry {
    fn fetch_xml(&self) -> ReportResult<String> {
        log::info!("Fetching registry summary from {}", self.url);
        let body = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(body)
    }
}

/// A registry document held in memory (tests, offline reruns).
pub struct StaticRegistry {
    xml: String,
}

impl StaticRegistry {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }
}

impl RegistrySource for StaticRegistry {
    fn fetch_xml(&self) -> ReportResult<String> {
        Ok(self.xml.clone())
    }
}

/// Parse every `<Resource>` in the document. Missing child elements are
/// `None`; `hidden` is true only for a `HiddenService` of `True`.
pub fn parse_registry(xml: &str) -> ReportResult<Vec<RegistryResource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut group_name: Option<String> = None;
    let mut current: Option<RegistryResource> = None;
    let mut element = String::new();

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) => {
                element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match element.as_str() {
                    "ResourceGroup" => group_name = None,
                    "Resource" => {
                        current = Some(RegistryResource {
                            group_name: group_name.clone(),
                            fqdn: None,
                            name: None,
                            hidden: false,
                        })
                    }
                    _ => {}
                }
            }
            XmlEvent::Text(t) => {
                let text = t.unescape()?.into_owned();
                match (element.as_str(), current.as_mut()) {
                    ("GroupName", None) => group_name = Some(text),
                    ("FQDN", Some(r)) => r.fqdn = Some(text),
                    ("Name", Some(r)) if r.name.is_none() => r.name = Some(text),
                    ("HiddenService", Some(r)) => r.hidden = text == "True",
                    _ => {}
                }
            }
            XmlEvent::End(e) => {
                if e.name().as_ref() == b"Resource" {
                    if let Some(r) = current.take() {
                        resources.push(r);
                    }
                }
                element.clear();
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    log::debug!("registry document lists {} resources", resources.len());
    Ok(resources)
}
