//! Capability checks.
//!
//! Whether an action is offered depends only on the action, the state of the
//! entity it targets and the caller's roles. Roles are resolved upstream and
//! handed to us as a plain list.

use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::warn;

use crate::models::{Card, OnlinePurchase};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Operator,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adm" | "admin" => Ok(Role::Admin),
            "op" | "operator" => Ok(Role::Operator),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles(HashSet<Role>);

impl Roles {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Parses a comma separated list such as `adm,op`. Unknown entries are
    /// ignored.
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| s.parse().ok())
                .collect(),
        )
    }

    pub fn has(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has(*r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ManagePaymentMethods,
    CreateEvent,
    GenerateInventory,
    GenerateMoreBooks,
    Assign,
    TransferCustody,
    Return,
    Settle,
    BatchTransition,
    ExportCards,
    CreatePurchase,
    ViewPurchase,
    RefreshPurchase,
    PayPurchase,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ManagePaymentMethods => "manage_payment_methods",
            Action::CreateEvent => "create_event",
            Action::GenerateInventory => "generate_inventory",
            Action::GenerateMoreBooks => "generate_more_books",
            Action::Assign => "assign",
            Action::TransferCustody => "transfer_custody",
            Action::Return => "return",
            Action::Settle => "settle",
            Action::BatchTransition => "batch_transition",
            Action::ExportCards => "export_cards",
            Action::CreatePurchase => "create_purchase",
            Action::ViewPurchase => "view_purchase",
            Action::RefreshPurchase => "refresh_purchase",
            Action::PayPurchase => "pay_purchase",
        }
    }
}

pub const CARD_ACTIONS: [Action; 4] = [
    Action::Assign,
    Action::TransferCustody,
    Action::Return,
    Action::Settle,
];

/// The entity an action is about, as far as permissions care.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Nothing,
    Event { has_books: bool },
    Card(&'a Card),
    Purchase(&'a OnlinePurchase),
}

const STAFF: [Role; 2] = [Role::Admin, Role::Operator];

pub fn is_allowed(action: Action, subject: Subject<'_>, roles: &Roles) -> bool {
    match (action, subject) {
        (Action::ManagePaymentMethods | Action::CreateEvent | Action::GenerateMoreBooks, _) => {
            roles.has(Role::Admin)
        }
        (Action::GenerateInventory, Subject::Event { has_books }) => {
            roles.has(Role::Admin) && !has_books
        }
        (Action::Assign, Subject::Card(card)) => card.assignee_id.is_none() && roles.any(&STAFF),
        (Action::TransferCustody, Subject::Card(card)) => {
            card.assignee_id.is_some() && card.paid.is_none() && roles.any(&STAFF)
        }
        (Action::Return | Action::Settle, Subject::Card(card)) => {
            card.assignee_id.is_some() && roles.any(&STAFF)
        }
        (Action::BatchTransition, _) => roles.any(&STAFF),
        (Action::ExportCards | Action::CreatePurchase | Action::ViewPurchase, _) => true,
        (Action::RefreshPurchase | Action::PayPurchase, Subject::Purchase(purchase)) => {
            !purchase.is_confirmed()
        }
        _ => false,
    }
}

pub fn authorize(action: Action, subject: Subject<'_>, roles: &Roles) -> Result<(), AppError> {
    if is_allowed(action, subject, roles) {
        Ok(())
    } else {
        warn!(?action, ?roles, "Action denied");
        Err(AppError::Forbidden(format!(
            "Action '{}' is not available",
            action.as_str()
        )))
    }
}

/// Card actions the caller may perform on `card` right now.
pub fn card_actions(card: &Card, roles: &Roles) -> Vec<Action> {
    CARD_ACTIONS
        .into_iter()
        .filter(|action| is_allowed(*action, Subject::Card(card), roles))
        .collect()
}
