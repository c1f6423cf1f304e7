//! Object-level access rules for quotes, orders and reviews.
//!
//! Each check is a pure function of the acting user and the loaded records,
//! so the rules can be exercised without a store or a transport.

use crate::domain::actor::Actor;
use crate::domain::design::Design;
use crate::domain::order::Order;
use crate::domain::quote::{Quote, QuoteChange, QuoteStatus};
use crate::domain::review::Review;
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), ApplicationError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(ApplicationError::Forbidden(reason)),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self::Deny(reason.into())
    }
}

/// Request-shape check that needs no records: only manufacturers quote.
pub fn can_submit_quotes(actor: &Actor) -> AccessDecision {
    if actor.is_manufacturer() {
        AccessDecision::Allow
    } else {
        AccessDecision::deny("Only authenticated manufacturers can create quotes.")
    }
}

pub fn can_create_quote(actor: &Actor, design: &Design) -> AccessDecision {
    if let AccessDecision::Deny(reason) = can_submit_quotes(actor) {
        return AccessDecision::Deny(reason);
    }
    if design.is_owned_by(&actor.id) {
        return AccessDecision::deny("Manufacturers cannot quote their own designs.");
    }
    if !design.accepts_quotes() {
        return AccessDecision::Deny(format!(
            "Design must be in 'Analysis Complete' status to receive quotes. Current status: {}.",
            design.status.label()
        ));
    }
    AccessDecision::Allow
}

fn is_participant(actor: &Actor, quote: &Quote, design: &Design) -> bool {
    quote.manufacturer_id == actor.id || design.is_owned_by(&actor.id)
}

pub fn can_view_quote(actor: &Actor, quote: &Quote, design: &Design) -> AccessDecision {
    if actor.is_staff || is_participant(actor, quote, design) {
        AccessDecision::Allow
    } else {
        AccessDecision::deny("You do not have permission to access this quote.")
    }
}

/// Filters a design's quotes down to what `actor` may list. Staff and the
/// design owner see every quote, a manufacturer sees its own, anyone else
/// gets an empty list rather than an error.
pub fn visible_quotes(actor: &Actor, design: &Design, quotes: Vec<Quote>) -> Vec<Quote> {
    if actor.is_staff || design.is_owned_by(&actor.id) {
        return quotes;
    }
    if actor.is_manufacturer() {
        return quotes.into_iter().filter(|quote| quote.manufacturer_id == actor.id).collect();
    }
    Vec::new()
}

pub fn can_update_quote(
    actor: &Actor,
    quote: &Quote,
    design: &Design,
    change: &QuoteChange,
) -> AccessDecision {
    if actor.is_staff {
        if change.has_field_changes() && !quote.is_pending() {
            return AccessDecision::deny(
                "Quote details can only be changed while the quote is PENDING.",
            );
        }
        return AccessDecision::Allow;
    }

    let is_design_owner = design.is_owned_by(&actor.id);
    let is_quote_creator = quote.manufacturer_id == actor.id;
    if !is_design_owner && !is_quote_creator {
        return AccessDecision::deny(
            "You do not have permission to update this quote or perform this status change.",
        );
    }

    if let Some(next) = change.status {
        let current = quote.status;
        if is_design_owner {
            let allowed = current == QuoteStatus::Pending
                && matches!(next, QuoteStatus::Accepted | QuoteStatus::Rejected);
            if !allowed {
                return AccessDecision::Deny(format!(
                    "Customer can only change status from Pending to Accepted/Rejected. \
                     Invalid transition from '{}' to '{}'.",
                    current.as_str(),
                    next.as_str()
                ));
            }
        } else {
            let allowed = current == QuoteStatus::Pending
                && matches!(next, QuoteStatus::Expired | QuoteStatus::Pending);
            if !allowed {
                return AccessDecision::Deny(format!(
                    "Manufacturer cannot make this status transition from '{}' to '{}'.",
                    current.as_str(),
                    next.as_str()
                ));
            }
        }
    }

    if change.has_field_changes() {
        if !is_quote_creator {
            return AccessDecision::deny(
                "You cannot update this quote in its current state or with the provided data.",
            );
        }
        if !quote.is_pending() {
            return AccessDecision::deny(
                "Manufacturer can only update details of a PENDING quote, or mark it EXPIRED.",
            );
        }
    }

    AccessDecision::Allow
}

pub fn can_delete_quote(actor: &Actor, quote: &Quote, design: &Design) -> AccessDecision {
    if let AccessDecision::Deny(reason) = can_view_quote(actor, quote, design) {
        return AccessDecision::Deny(reason);
    }
    if actor.is_staff || (quote.manufacturer_id == actor.id && quote.is_pending()) {
        AccessDecision::Allow
    } else {
        AccessDecision::deny("You can only delete PENDING quotes that you created.")
    }
}

pub fn can_view_order(actor: &Actor, order: &Order) -> AccessDecision {
    if actor.is_staff || order.customer_id == actor.id || order.manufacturer_id == actor.id {
        AccessDecision::Allow
    } else {
        AccessDecision::deny("You do not have permission to access this order.")
    }
}

/// `target` is the directory record for the manufacturer being reviewed,
/// if one exists under that id.
pub fn can_create_review(actor: &Actor, target: Option<&Actor>) -> AccessDecision {
    if !actor.is_customer() {
        return AccessDecision::deny("Only authenticated customers can submit reviews.");
    }
    match target {
        Some(manufacturer) if manufacturer.is_manufacturer() => AccessDecision::Allow,
        _ => AccessDecision::deny("Manufacturer to be reviewed not found or is not a valid manufacturer."),
    }
}

pub fn can_modify_review(actor: &Actor, review: &Review) -> AccessDecision {
    if actor.is_staff || review.is_written_by(&actor.id) {
        AccessDecision::Allow
    } else {
        AccessDecision::deny("You do not have permission to perform this action.")
    }
}
