//! Utilities for our logging (tracing) infrastructure.

use std::fmt::Debug;
use tracing::{warn, Span};

/// For the current active span, record `field_value` for the field
/// `field_name`. The field must already be declared on the span, usually in
/// the `fields(...)` list of an `#[instrument]` attribute.
///
/// Every event emitted inside the span carries the field, e.g.
/// ```text
///   2023-03-01T10:02:11.120412Z  INFO dapp_connector_broker::operations::query: Dispatching query.
///     in dapp_connector_broker::broker::handle_runtime with request_id: "5f0c...", origin: "https://dapp.example", uid: 3
/// ```
///
/// In debug builds a missing field is reported with a warning.
pub fn record_field(field_name: &str, field_value: &dyn Debug) {
    if cfg!(debug_assertions) && !Span::current().has_field(field_name) {
        warn!("Field {} not defined in current span!", field_name);
    }

    let _ = Span::current().record(field_name, &format!("{field_value:?}"));
}
