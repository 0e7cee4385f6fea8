//! Injection precedence between builds of the same extension family.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use strum::{Display, EnumString};

/// Build of the extension doing the injection. A higher precedence build
/// replaces whatever a lower one installed.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BuildFlavor {
    #[default]
    Prod = 0,
    Nightly = 1,
    Dev = 2,
}

impl BuildFlavor {
    pub fn precedence(self) -> u8 {
        self as u8
    }
}

/// The hidden marker element left in the document by the last injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionMarker {
    pub flavor: BuildFlavor,
    pub wallet_name: String,
}

/// `true` if a build of `own` flavor may inject over `existing`.
pub fn may_inject(own: BuildFlavor, existing: Option<&InjectionMarker>) -> bool {
    match existing {
        Some(marker) => own.precedence() >= marker.flavor.precedence(),
        None => true,
    }
}

/// The parts of a page's DOM the connector reads or writes.
pub trait Document: Send + Sync {
    fn origin(&self) -> String;
    /// `href` of the document's declared `<link rel="icon">`, if any.
    fn icon_href(&self) -> Option<String>;
    fn injection_marker(&self) -> Option<InjectionMarker>;
    fn set_injection_marker(&self, marker: InjectionMarker);
}

/// A document with a fixed origin and icon.
#[derive(Debug)]
pub struct StaticDocument {
    origin: String,
    icon_href: Option<String>,
    marker: Mutex<Option<InjectionMarker>>,
}

impl StaticDocument {
    pub fn new(origin: impl Into<String>, icon_href: Option<String>) -> Self {
        Self {
            origin: origin.into(),
            icon_href,
            marker: Mutex::new(None),
        }
    }
}

impl Document for StaticDocument {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn icon_href(&self) -> Option<String> {
        self.icon_href.clone()
    }

    fn injection_marker(&self) -> Option<InjectionMarker> {
        match self.marker.lock() {
            Ok(marker) => marker.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_injection_marker(&self, marker: InjectionMarker) {
        match self.marker.lock() {
            Ok(mut slot) => *slot = Some(marker),
            Err(poisoned) => *poisoned.into_inner() = Some(marker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(flavor: BuildFlavor) -> InjectionMarker {
        InjectionMarker {
            flavor,
            wallet_name: "yoroi".to_string(),
        }
    }

    #[test]
    fn most_specific_build_wins() {
        assert!(may_inject(BuildFlavor::Prod, None));
        assert!(may_inject(BuildFlavor::Dev, Some(&marker(BuildFlavor::Prod))));
        assert!(may_inject(BuildFlavor::Nightly, Some(&marker(BuildFlavor::Nightly))));
        assert!(!may_inject(BuildFlavor::Prod, Some(&marker(BuildFlavor::Dev))));
        assert!(!may_inject(BuildFlavor::Nightly, Some(&marker(BuildFlavor::Dev))));
    }

    #[test]
    fn static_document_keeps_marker() {
        let document = StaticDocument::new("https://dapp.example", None);
        assert_eq!(document.injection_marker(), None);
        document.set_injection_marker(marker(BuildFlavor::Nightly));
        assert_eq!(
            document.injection_marker().map(|m| m.flavor),
            Some(BuildFlavor::Nightly)
        );
    }
}
