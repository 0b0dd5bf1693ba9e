use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{CardId, ExpenseId, InvoiceId, InvoiceStatus};

/// all events emitted by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BillingEvent {
    // invoice lifecycle events
    InvoiceOpened {
        invoice_id: InvoiceId,
        credit_card_id: CardId,
        closing_date: NaiveDate,
        due_date: NaiveDate,
        status: InvoiceStatus,
        initial_amount: Money,
    },
    InvoiceAccrued {
        invoice_id: InvoiceId,
        amount: Money,
        new_total: Money,
    },
    InvoicePaid {
        invoice_id: InvoiceId,
        settled_expenses: u32,
        failed_expenses: u32,
    },
    CycleRolledForward {
        credit_card_id: CardId,
        invoice_id: InvoiceId,
        closing_date: NaiveDate,
    },

    // expense events
    ExpenseRecorded {
        expense_id: ExpenseId,
        invoice_id: Option<InvoiceId>,
        amount: Money,
    },
    InstallmentsAllocated {
        credit_card_id: CardId,
        installments: u32,
        installment_amount: Money,
    },
    ExpenseSettled {
        expense_id: ExpenseId,
    },
    ExpenseSettlementFailed {
        expense_id: ExpenseId,
        message: String,
    },
    AllocationUnwound {
        invoice_id: InvoiceId,
        amount: Money,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<BillingEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: BillingEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn extend(&mut self, events: Vec<BillingEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[BillingEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
