// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Zone resolution: mapping a ZIP code or state to a configured zone.
//!
//! Resolution is deterministic: zones are checked in configuration order
//! and the first match wins. No match means the channel is simply not
//! offered there — a normal outcome the caller handles by offering an
//! alternate fulfillment type, never an error.

use crate::model::{DeliveryZone, ShippingZone};

/// Resolve a ZIP code to a delivery zone.
///
/// A zone matches when the ZIP equals a listed code or starts with one
/// (prefix match, so "941" covers all of "941xx"). Empty configured codes
/// are ignored rather than matching everything.
pub fn resolve_delivery_zone<'a>(
    zones: &'a [DeliveryZone],
    zip: &str,
) -> Option<&'a DeliveryZone> {
    let zip = zip.trim();
    if zip.is_empty() {
        return None;
    }
    zones.iter().find(|zone| {
        zone.zip_codes
            .iter()
            .any(|code| !code.is_empty() && (zip == code || zip.starts_with(code.as_str())))
    })
}

/// Resolve a state name or code to a shipping zone.
///
/// Matching is case-insensitive: the query matches when it equals a listed
/// state or appears within one, so a zone listing "California" matches both
/// "california" and "Calif". The listed value is the broader term; a zone
/// listing only the code "CA" does not match a query of "California".
pub fn resolve_shipping_zone<'a>(
    zones: &'a [ShippingZone],
    state: &str,
) -> Option<&'a ShippingZone> {
    let query = state.trim().to_ascii_lowercase();
    if query.is_empty() {
        return None;
    }
    zones.iter().find(|zone| {
        zone.states.iter().any(|listed| {
            let listed = listed.trim().to_ascii_lowercase();
            !listed.is_empty() && (listed == query || listed.contains(&query))
        })
    })
}
