//! Human-readable one-line summaries for auction events.
//!
//! The headline is a pure function of the event payload and the resolved
//! context, so re-running enrichment with the same inputs produces the same
//! text.

use super::auction_event::{Enrichment, EventKind, WeiAmount};

/// Builds the headline for an event given its (possibly partial) enrichment.
#[must_use]
pub fn build_headline(noun_id: u64, kind: &EventKind, enrichment: &Enrichment) -> String {
    match kind {
        EventKind::Created { .. } => format!("Auction for Noun {noun_id} started"),
        EventKind::Bid {
            bidder, value_wei, ..
        } => {
            let who = display_name(enrichment.resolved_bidder_name.as_deref(), bidder);
            format!(
                "{who} bid {} on Noun {noun_id}",
                format_value(*value_wei, enrichment.value_usd)
            )
        }
        EventKind::Settled { winner, amount_wei } => {
            let who = display_name(enrichment.resolved_winner_name.as_deref(), winner);
            format!(
                "Noun {noun_id} won by {who} for {}",
                format_value(*amount_wei, enrichment.amount_usd)
            )
        }
    }
}

fn display_name(resolved: Option<&str>, address: &str) -> String {
    match resolved {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => shorten_address(address),
    }
}

fn format_value(wei: WeiAmount, usd: Option<f64>) -> String {
    let eth = format!("Ξ{:.2}", wei.as_eth());
    match usd {
        Some(usd) => format!("{eth} ({})", format_usd(usd)),
        None => eth,
    }
}

/// Shortens `0x1234567890abcdef…` to `0x1234…cdef`.
#[must_use]
pub fn shorten_address(address: &str) -> String {
    let len = address.len();
    match (address.get(..6), address.get(len.saturating_sub(4)..)) {
        (Some(head), Some(tail)) if len > 10 => format!("{head}…{tail}"),
        _ => address.to_string(),
    }
}

/// Formats a dollar amount with thousands separators and cents.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Rounds a fiat value to whole cents.
#[must_use]
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
