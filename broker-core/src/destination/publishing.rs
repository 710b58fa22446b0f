//! Bookkeeping of the links currently publishing to a destination.

use crate::sync::lock;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishingLink {
    pub name: String,
    pub address: Option<String>,
}

impl PublishingLink {
    pub fn new(name: impl Into<String>, address: Option<&str>) -> Self {
        Self {
            name: name.into(),
            address: address.map(str::to_string),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PublishingLinks {
    links: Mutex<HashMap<String, PublishingLink>>,
}

impl PublishingLinks {
    pub(crate) fn add(&self, link: PublishingLink) -> bool {
        let mut links = lock(&self.links);
        if links.contains_key(&link.name) {
            return false;
        }
        links.insert(link.name.clone(), link);
        true
    }

    pub(crate) fn remove(&self, link_name: &str) -> bool {
        lock(&self.links).remove(link_name).is_some()
    }

    pub(crate) fn snapshot(&self) -> Vec<PublishingLink> {
        lock(&self.links).values().cloned().collect()
    }
}
