use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{CardId, ExpenseId, InvoiceId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("invalid expense: {}", messages.join("; "))]
    InvalidExpense {
        messages: Vec<String>,
    },

    #[error("credit card not found: {id}")]
    CreditCardNotFound {
        id: CardId,
    },

    #[error("invoice not found: {id}")]
    InvoiceNotFound {
        id: InvoiceId,
    },

    #[error("no invoice for card {card_id} closing on {closing_date}")]
    CycleNotFound {
        card_id: CardId,
        closing_date: NaiveDate,
    },

    #[error("expense not found: {id}")]
    ExpenseNotFound {
        id: ExpenseId,
    },

    #[error("invoice already closed: {id}")]
    InvoiceClosed {
        id: InvoiceId,
    },

    #[error("invoice already exists for card {card_id} closing on {closing_date}")]
    DuplicateCycle {
        card_id: CardId,
        closing_date: NaiveDate,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("store error: {message}")]
    Store {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, BillingError>;
