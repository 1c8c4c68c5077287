//! Card lifecycle: distribution, custody transfer, return and settlement.
//!
//! A card moves `Unassigned -> Assigned -> Settled(paid | unpaid)` and can be
//! returned to `Unassigned` from any assigned state. Every transition is
//! applied through [`apply_batch`], so a single card and a whole book obey
//! exactly the same rules: either every affected card accepts the
//! transition or none of them changes.

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Card;
use crate::services::inventory::card_label;
use crate::services::permissions::Action;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CardTransition {
    Assign {
        person_id: Uuid,
    },
    TransferCustody {
        person_id: Uuid,
    },
    Return,
    Settle {
        paid: bool,
        payment_method_id: Option<Uuid>,
        commission: Option<Decimal>,
    },
}

/// Which cards a transition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSelection {
    Card(Uuid),
    Book(Uuid),
    /// Inclusive range of card numbers in the event's physical books.
    Range { event_id: Uuid, first: i32, last: i32 },
}

impl CardSelection {
    pub fn range(event_id: Uuid, first: i32, last: i32) -> Result<Self, AppError> {
        if first <= 0 || last < first {
            return Err(AppError::ValidationError(format!(
                "Invalid card range {first}..{last}"
            )));
        }
        Ok(CardSelection::Range {
            event_id,
            first,
            last,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("Card {0} is already assigned")]
    AlreadyAssigned(String),

    #[error("Card {0} is not assigned to anyone")]
    NotAssigned(String),

    #[error("Card {0} has already been settled")]
    AlreadySettled(String),

    #[error("Inform the commission")]
    MissingCommission,

    #[error("Commission cannot be negative")]
    NegativeCommission,

    #[error("Commission cannot exceed {0}")]
    CommissionAboveCap(Decimal),

    #[error("{} cards rejected: {}", .0.len(), join_errors(.0))]
    Rejected(Vec<LifecycleError>),
}

fn join_errors(errors: &[LifecycleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::MissingCommission
            | LifecycleError::NegativeCommission
            | LifecycleError::CommissionAboveCap(_) => AppError::ValidationError(err.to_string()),
            _ => AppError::InvalidState(err.to_string()),
        }
    }
}

impl CardTransition {
    pub fn action(&self) -> Action {
        match self {
            CardTransition::Assign { .. } => Action::Assign,
            CardTransition::TransferCustody { .. } => Action::TransferCustody,
            CardTransition::Return => Action::Return,
            CardTransition::Settle { .. } => Action::Settle,
        }
    }

    /// Checks the submitted values on their own, before any card is looked at.
    pub fn validate(&self, max_commission: Decimal) -> Result<(), LifecycleError> {
        if let CardTransition::Settle {
            paid: true,
            commission,
            ..
        } = self
        {
            let commission = commission.ok_or(LifecycleError::MissingCommission)?;
            if commission < Decimal::ZERO {
                return Err(LifecycleError::NegativeCommission);
            }
            if commission > max_commission {
                return Err(LifecycleError::CommissionAboveCap(max_commission));
            }
        }
        Ok(())
    }

    /// Returns the card as it looks after the transition.
    pub fn apply(&self, card: &Card, max_commission: Decimal) -> Result<Card, LifecycleError> {
        self.validate(max_commission)?;

        let mut next = card.clone();
        match self {
            CardTransition::Assign { person_id } => {
                if card.assignee_id.is_some() {
                    return Err(LifecycleError::AlreadyAssigned(card.label()));
                }
                next.assignee_id = Some(*person_id);
            }
            CardTransition::TransferCustody { person_id } => {
                if card.assignee_id.is_none() {
                    return Err(LifecycleError::NotAssigned(card.label()));
                }
                if card.paid.is_some() {
                    return Err(LifecycleError::AlreadySettled(card.label()));
                }
                next.custody_id = Some(*person_id);
            }
            CardTransition::Return => {
                if card.assignee_id.is_none() {
                    return Err(LifecycleError::NotAssigned(card.label()));
                }
                next.assignee_id = None;
                next.custody_id = None;
                next.paid = None;
                next.payment_method_id = None;
                next.commission = Decimal::ZERO;
            }
            CardTransition::Settle {
                paid,
                payment_method_id,
                commission,
            } => {
                if card.assignee_id.is_none() {
                    return Err(LifecycleError::NotAssigned(card.label()));
                }
                next.paid = Some(*paid);
                if *paid {
                    next.payment_method_id = *payment_method_id;
                    next.commission = commission.unwrap_or(Decimal::ZERO);
                } else {
                    next.payment_method_id = None;
                    next.commission = Decimal::ZERO;
                }
            }
        }
        Ok(next)
    }
}

/// Applies `transition` to every card, all or nothing.
pub fn apply_batch(
    transition: &CardTransition,
    cards: &[Card],
    max_commission: Decimal,
) -> Result<Vec<Card>, LifecycleError> {
    transition.validate(max_commission)?;

    let mut updated = Vec::with_capacity(cards.len());
    let mut rejected = Vec::new();
    for card in cards {
        match transition.apply(card, max_commission) {
            Ok(next) => updated.push(next),
            Err(e) => rejected.push(e),
        }
    }

    match rejected.len() {
        0 => Ok(updated),
        1 => Err(rejected.remove(0)),
        _ => Err(LifecycleError::Rejected(rejected)),
    }
}

/// Cards sold through an online purchase: owned by the placeholder buyer,
/// paid through the gateway, no commission.
pub fn mark_sold_online(card: &Card, buyer_id: Uuid, method_id: Uuid) -> Card {
    Card {
        assignee_id: Some(buyer_id),
        custody_id: None,
        paid: Some(true),
        payment_method_id: Some(method_id),
        commission: Decimal::ZERO,
        ..card.clone()
    }
}

pub fn describe(cards: &[Card]) -> String {
    match cards {
        [] => "no cards".to_string(),
        [card] => format!("card {}", card.label()),
        [first, .., last] => format!(
            "{} cards ({}..{})",
            cards.len(),
            card_label(first.number),
            card_label(last.number)
        ),
    }
}
