//! Event financial summary and card export.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{CardDetail, CardStatus, Event};
use crate::services::inventory::{book_label, card_label};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub awaiting_distribution: usize,
    pub awaiting_settlement: usize,
    pub sold_with_commission: usize,
    pub sold_without_commission: usize,
    pub not_paid: usize,
}

impl StatusCounts {
    pub fn tally<'a>(cards: impl IntoIterator<Item = &'a CardDetail>) -> Self {
        let mut counts = Self::default();
        for card in cards {
            match card.status() {
                CardStatus::AwaitingDistribution => counts.awaiting_distribution += 1,
                CardStatus::AwaitingSettlement => counts.awaiting_settlement += 1,
                CardStatus::SoldWithCommission => counts.sold_with_commission += 1,
                CardStatus::SoldWithoutCommission => counts.sold_without_commission += 1,
                CardStatus::NotPaid => counts.not_paid += 1,
            }
        }
        counts
    }

    pub fn distributed(&self) -> usize {
        self.awaiting_settlement + self.paid() + self.not_paid
    }

    pub fn paid(&self) -> usize {
        self.sold_with_commission + self.sold_without_commission
    }
}

/// Money is counted at the net card value: the seller's maximum commission
/// never reaches the organisation unless the seller waives it, in which case
/// the waived part shows up as donation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub total_books: usize,
    pub total_cards: usize,
    pub distributed_cards: usize,
    pub paid_cards: usize,
    pub percent_distributed: Decimal,
    pub percent_paid: Decimal,
    pub net_card_value: Decimal,
    pub expected_revenue: Decimal,
    pub received_sales: Decimal,
    pub received_donation: Decimal,
    pub receivable: Decimal,
    pub lost: Decimal,
    pub final_revenue: Decimal,
    pub counts: StatusCounts,
}

fn percent(part: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}

pub fn summarize(event: &Event, cards: &[CardDetail]) -> EventSummary {
    let counts = StatusCounts::tally(cards);
    let net = event.net_card_value();
    let distributed = counts.distributed();
    let paid = counts.paid();

    let commissions_kept: Decimal = cards
        .iter()
        .filter(|c| c.status().is_paid())
        .map(|c| c.commission)
        .sum();

    let expected_revenue = Decimal::from(distributed) * net;
    let received_sales = Decimal::from(paid) * net;
    let received_donation = Decimal::from(paid) * event.max_commission - commissions_kept;
    let book_count = cards
        .iter()
        .map(|c| c.book_number)
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    EventSummary {
        total_books: book_count,
        total_cards: cards.len(),
        distributed_cards: distributed,
        paid_cards: paid,
        percent_distributed: percent(distributed, cards.len()),
        percent_paid: percent(paid, cards.len()),
        net_card_value: net,
        expected_revenue,
        received_sales,
        received_donation,
        receivable: expected_revenue - received_sales,
        lost: Decimal::from(counts.not_paid) * net,
        final_revenue: received_sales + received_donation,
        counts,
    }
}

/// Distributed cards per assignee name, for the event overview.
pub fn by_assignee(cards: &[CardDetail]) -> BTreeMap<String, StatusCounts> {
    let mut grouped: BTreeMap<String, Vec<&CardDetail>> = BTreeMap::new();
    for card in cards {
        if let Some(name) = &card.assignee_name {
            grouped.entry(name.clone()).or_default().push(card);
        }
    }
    grouped
        .into_iter()
        .map(|(name, cards)| (name, StatusCounts::tally(cards)))
        .collect()
}

const EXPORT_HEADER: [&str; 7] = [
    "Card number",
    "Book",
    "Assignee",
    "Custody",
    "Card value",
    "Commission",
    "Status",
];

/// CSV with one row per card, in the order given.
pub fn export_csv(event: &Event, cards: &[CardDetail]) -> Result<Vec<u8>, AppError> {
    let net = event.net_card_value().to_string();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER).map_err(export_error)?;
    for card in cards {
        let commission = card.commission.to_string();
        writer
            .write_record([
                card_label(card.number).as_str(),
                book_label(card.book_number).as_str(),
                card.assignee_name.as_deref().unwrap_or(""),
                card.custody_name.as_deref().unwrap_or(""),
                net.as_str(),
                commission.as_str(),
                card.status().label(),
            ])
            .map_err(export_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::InternalServerError(format!("CSV export failed: {e}")))
}

fn export_error(err: csv::Error) -> AppError {
    AppError::InternalServerError(format!("CSV export failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn event() -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Festa Junina".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 6, 24).unwrap(),
            book_count: 2,
            cards_per_book: 3,
            sale_price: Decimal::from(10),
            max_commission: Decimal::from(2),
            created_at: Utc::now(),
        }
    }

    fn detail(number: i32, assignee: Option<&str>, paid: Option<bool>, commission: i64) -> CardDetail {
        CardDetail {
            id: Uuid::new_v4(),
            book_id: Uuid::nil(),
            book_number: (number - 1) / 3 + 1,
            number,
            assignee_id: assignee.map(|_| Uuid::new_v4()),
            assignee_name: assignee.map(str::to_string),
            custody_id: None,
            custody_name: None,
            paid,
            payment_method_id: None,
            payment_method_name: None,
            commission: Decimal::from(commission),
        }
    }

    fn cards() -> Vec<CardDetail> {
        vec![
            detail(1, Some("Ana"), Some(true), 2),
            detail(2, Some("Ana"), Some(true), 0),
            detail(3, Some("Bruno"), Some(false), 0),
            detail(4, Some("Bruno"), None, 0),
            detail(5, None, None, 0),
            detail(6, None, None, 0),
        ]
    }

    #[test]
    fn test_summary_matches_hand_computed_totals() {
        let summary = summarize(&event(), &cards());

        assert_eq!(summary.total_books, 2);
        assert_eq!(summary.total_cards, 6);
        assert_eq!(summary.distributed_cards, 4);
        assert_eq!(summary.paid_cards, 2);
        assert_eq!(summary.net_card_value, Decimal::from(8));
        // 4 distributed * 8
        assert_eq!(summary.expected_revenue, Decimal::from(32));
        // 2 paid * 8
        assert_eq!(summary.received_sales, Decimal::from(16));
        // 2 paid * 2 cap - (2 + 0) kept
        assert_eq!(summary.received_donation, Decimal::from(2));
        assert_eq!(summary.receivable, Decimal::from(16));
        assert_eq!(summary.lost, Decimal::from(8));
        assert_eq!(summary.final_revenue, Decimal::from(18));
        assert_eq!(summary.percent_distributed, Decimal::new(6667, 2));
        assert_eq!(summary.percent_paid, Decimal::new(3333, 2));
    }

    #[test]
    fn test_empty_event_summary() {
        let summary = summarize(&event(), &[]);
        assert_eq!(summary.total_cards, 0);
        assert_eq!(summary.percent_distributed, Decimal::ZERO);
        assert_eq!(summary.final_revenue, Decimal::ZERO);
    }

    #[test]
    fn test_by_assignee_skips_undistributed_cards() {
        let grouped = by_assignee(&cards());
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["Ana"].paid(), 2);
        assert_eq!(grouped["Bruno"].not_paid, 1);
        assert_eq!(grouped["Bruno"].awaiting_settlement, 1);
    }

    #[test]
    fn test_export_rows() {
        let bytes = export_csv(&event(), &cards()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(
            lines[0],
            "Card number,Book,Assignee,Custody,Card value,Commission,Status"
        );
        assert_eq!(lines[1], "00001,001,Ana,,8,2,Sold with commission");
        assert_eq!(lines[3], "00003,001,Bruno,,8,0,Payment not made");
        assert_eq!(lines[6], "00006,002,,,8,0,Awaiting distribution");
    }
}
