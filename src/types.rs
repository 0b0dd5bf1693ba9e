use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::BillingError;

/// unique identifier for a credit card
pub type CardId = Uuid;
/// unique identifier for an invoice
pub type InvoiceId = Uuid;
/// unique identifier for an expense
pub type ExpenseId = Uuid;

/// issuing bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bank {
    Nubank,
    Itau,
    Bradesco,
    Santander,
    BancoDoBrasil,
    Caixa,
    Inter,
    Other,
}

/// invoice status over the billing cycle lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// cycle closes in a future month
    OpenedFuture,
    /// the presently accruing cycle
    OpenedCurrent,
    /// settled; also the creation default for retroactive cycles
    Paid,
    /// finished accruing, awaiting payment; total is immutable
    Closed,
}

/// expense settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseStatus {
    Pending,
    Paid,
}

/// expense type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseType {
    Fixed,
    Casual,
    Emergency,
    Subscription,
}

/// expense category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Food,
    Transport,
    Housing,
    Health,
    Education,
    Entertainment,
    Shopping,
    Travel,
    Other,
}

impl FromStr for Bank {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nubank" => Ok(Bank::Nubank),
            "itau" => Ok(Bank::Itau),
            "bradesco" => Ok(Bank::Bradesco),
            "santander" => Ok(Bank::Santander),
            "bancodobrasil" | "banco_do_brasil" => Ok(Bank::BancoDoBrasil),
            "caixa" => Ok(Bank::Caixa),
            "inter" => Ok(Bank::Inter),
            "other" => Ok(Bank::Other),
            _ => Err(BillingError::InvalidExpense {
                messages: vec![format!("unknown bank: {s}")],
            }),
        }
    }
}

impl FromStr for ExpenseType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ExpenseType::Fixed),
            "casual" => Ok(ExpenseType::Casual),
            "emergency" => Ok(ExpenseType::Emergency),
            "subscription" => Ok(ExpenseType::Subscription),
            _ => Err(BillingError::InvalidExpense {
                messages: vec![format!("unknown expense type: {s}")],
            }),
        }
    }
}

impl FromStr for ExpenseCategory {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Ok(ExpenseCategory::Food),
            "transport" => Ok(ExpenseCategory::Transport),
            "housing" => Ok(ExpenseCategory::Housing),
            "health" => Ok(ExpenseCategory::Health),
            "education" => Ok(ExpenseCategory::Education),
            "entertainment" => Ok(ExpenseCategory::Entertainment),
            "shopping" => Ok(ExpenseCategory::Shopping),
            "travel" => Ok(ExpenseCategory::Travel),
            "other" => Ok(ExpenseCategory::Other),
            _ => Err(BillingError::InvalidExpense {
                messages: vec![format!("unknown expense category: {s}")],
            }),
        }
    }
}

/// credit card configuration; read-only input to the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: CardId,
    pub nickname: String,
    pub bank: Bank,
    pub limit: Money,
    /// day of the month the statement closes (1..=31)
    pub closing_day: u8,
    /// day of the month the statement is due (1..=31)
    pub due_day: u8,
}

impl CreditCard {
    /// create a card, validating the fields the engine depends on
    pub fn new(
        nickname: impl Into<String>,
        bank: Bank,
        limit: Money,
        closing_day: u8,
        due_day: u8,
    ) -> crate::errors::Result<Self> {
        let mut messages = Vec::new();

        if !(1..=31).contains(&closing_day) {
            messages.push(format!("closing day must be within 1..=31, got {closing_day}"));
        }
        if !(1..=31).contains(&due_day) {
            messages.push(format!("due day must be within 1..=31, got {due_day}"));
        }
        if limit.is_negative() {
            messages.push(format!("credit limit must not be negative, got {limit}"));
        }

        if !messages.is_empty() {
            return Err(BillingError::InvalidExpense { messages });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
            bank,
            limit,
            closing_day,
            due_day,
        })
    }
}

/// one monthly statement of a credit card
///
/// at most one invoice exists per (card, closing date) pair; that pair is
/// the cycle's identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub credit_card_id: CardId,
    pub current_amount: Money,
    pub status: InvoiceStatus,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// a single expense row
///
/// installment expenses carry their 1-based index and link to the invoice
/// whose cycle matches their effective date; standalone expenses link to
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub name: String,
    pub price: Money,
    pub expense_type: ExpenseType,
    pub category: Option<ExpenseCategory>,
    pub status: ExpenseStatus,
    pub credit_card_id: Option<CardId>,
    pub invoice_id: Option<InvoiceId>,
    pub installment_number: Option<u32>,
    pub expense_date: NaiveDate,
}

/// invoice fields as handed to the store for creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub credit_card_id: CardId,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub initial_amount: Money,
}

/// expense fields as handed to the store for creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub name: String,
    pub price: Money,
    pub expense_type: ExpenseType,
    pub category: Option<ExpenseCategory>,
    pub status: ExpenseStatus,
    pub credit_card_id: Option<CardId>,
    pub invoice_id: Option<InvoiceId>,
    pub installment_number: Option<u32>,
    pub expense_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_validation() {
        let card = CreditCard::new("personal", Bank::Nubank, Money::from_major(5_000), 10, 17);
        assert!(card.is_ok());

        let err = CreditCard::new("bad", Bank::Itau, Money::from_major(-1), 0, 32).unwrap_err();
        match err {
            BillingError::InvalidExpense { messages } => assert_eq!(messages.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_enum_parsing_at_boundary() {
        assert_eq!("fixed".parse::<ExpenseType>().unwrap(), ExpenseType::Fixed);
        assert_eq!("Travel".parse::<ExpenseCategory>().unwrap(), ExpenseCategory::Travel);
        assert!("groceries".parse::<ExpenseCategory>().is_err());
        assert_eq!("banco_do_brasil".parse::<Bank>().unwrap(), Bank::BancoDoBrasil);
    }

    #[test]
    fn test_invoice_json_round_trip() {
        let invoice = Invoice {
            id: Uuid::new_v4(),
            credit_card_id: Uuid::new_v4(),
            current_amount: Money::from_str_exact("1234.56").unwrap(),
            status: InvoiceStatus::OpenedCurrent,
            closing_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        };

        let json = serde_json::to_string(&invoice).unwrap();
        let back: Invoice = serde_json::from_str(&json).unwrap();
        assert_eq!(invoice, back);
    }
}
