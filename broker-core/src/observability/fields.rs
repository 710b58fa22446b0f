//! Formatting helpers for structured log field values.

use crate::data_plane::delivery::{DeliveryState, DeliveryTag};
use crate::destination::Destination;
use std::fmt::Write;

/// Renders a delivery tag as lowercase hex.
pub(crate) fn format_delivery_tag(tag: &DeliveryTag) -> String {
    let mut rendered = String::with_capacity(tag.as_bytes().len() * 2);
    for byte in tag.as_bytes() {
        let _ = write!(rendered, "{byte:02x}");
    }
    rendered
}

pub(crate) fn format_state(state: Option<&DeliveryState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "none".to_string(),
    }
}

pub(crate) fn format_destination(destination: &Destination) -> String {
    format!("{}:{}", destination.kind(), destination.name())
}
