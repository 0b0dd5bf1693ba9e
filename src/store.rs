use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::{
    CardId, CreditCard, Expense, ExpenseDraft, ExpenseId, ExpenseStatus, Invoice, InvoiceDraft,
    InvoiceId, InvoiceStatus,
};

/// narrow persistence contract consumed by the billing engine
///
/// implementations must serialize amount increments per invoice row and
/// enforce the one-invoice-per-(card, closing date) key on creation.
pub trait BillingStore: Send + Sync {
    fn find_credit_card(&self, id: CardId) -> Result<Option<CreditCard>>;

    fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    /// look an invoice up by its cycle identity key
    fn find_invoice_by_cycle(
        &self,
        card_id: CardId,
        closing_date: NaiveDate,
    ) -> Result<Option<Invoice>>;

    /// fails with `DuplicateCycle` if the (card, closing date) key exists
    fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice>;

    /// conditional increment; fails with `InvoiceClosed` on a closed invoice
    fn increment_invoice_amount(&self, id: InvoiceId, delta: Money) -> Result<Invoice>;

    fn set_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice>;

    /// batch insert, all-or-nothing
    fn create_expenses(&self, drafts: Vec<ExpenseDraft>) -> Result<Vec<Expense>>;

    fn list_expenses_by_invoice(&self, id: InvoiceId) -> Result<Vec<Expense>>;

    fn find_expense(&self, id: ExpenseId) -> Result<Option<Expense>>;

    fn set_expense_status(&self, id: ExpenseId, status: ExpenseStatus) -> Result<Expense>;
}

#[derive(Debug, Default)]
struct StoreState {
    cards: HashMap<CardId, CreditCard>,
    invoices: HashMap<InvoiceId, Invoice>,
    expenses: HashMap<ExpenseId, Expense>,
    // cycle identity key -> invoice
    cycle_index: HashMap<(CardId, NaiveDate), InvoiceId>,
}

/// in-memory store for tests and in-process embedding
///
/// a single mutex guards all state, so conditional increments and
/// unique-key checks are atomic with respect to concurrent commands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// register a card; card management itself lives outside the engine
    pub fn insert_card(&self, card: CreditCard) -> Result<CreditCard> {
        let mut state = self.lock()?;
        state.cards.insert(card.id, card.clone());
        Ok(card)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| BillingError::Store {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl BillingStore for MemoryStore {
    fn find_credit_card(&self, id: CardId) -> Result<Option<CreditCard>> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }

    fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.lock()?.invoices.get(&id).cloned())
    }

    fn find_invoice_by_cycle(
        &self,
        card_id: CardId,
        closing_date: NaiveDate,
    ) -> Result<Option<Invoice>> {
        let state = self.lock()?;
        let id = state.cycle_index.get(&(card_id, closing_date));
        Ok(id.and_then(|id| state.invoices.get(id)).cloned())
    }

    fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice> {
        let mut state = self.lock()?;
        let key = (draft.credit_card_id, draft.closing_date);

        if state.cycle_index.contains_key(&key) {
            return Err(BillingError::DuplicateCycle {
                card_id: draft.credit_card_id,
                closing_date: draft.closing_date,
            });
        }

        let invoice = Invoice {
            id: Uuid::new_v4(),
            credit_card_id: draft.credit_card_id,
            current_amount: draft.initial_amount,
            status: draft.status,
            closing_date: draft.closing_date,
            due_date: draft.due_date,
        };

        state.cycle_index.insert(key, invoice.id);
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn increment_invoice_amount(&self, id: InvoiceId, delta: Money) -> Result<Invoice> {
        let mut state = self.lock()?;
        let invoice = state
            .invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound { id })?;

        if invoice.status == InvoiceStatus::Closed {
            return Err(BillingError::InvoiceClosed { id });
        }

        invoice.current_amount += delta;
        Ok(invoice.clone())
    }

    fn set_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
        let mut state = self.lock()?;
        let invoice = state
            .invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound { id })?;

        invoice.status = status;
        Ok(invoice.clone())
    }

    fn create_expenses(&self, drafts: Vec<ExpenseDraft>) -> Result<Vec<Expense>> {
        let mut state = self.lock()?;

        // validate the whole batch before inserting any row
        for draft in &drafts {
            if let Some(invoice_id) = draft.invoice_id {
                if !state.invoices.contains_key(&invoice_id) {
                    return Err(BillingError::InvoiceNotFound { id: invoice_id });
                }
            }
        }

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let expense = Expense {
                id: Uuid::new_v4(),
                name: draft.name,
                price: draft.price,
                expense_type: draft.expense_type,
                category: draft.category,
                status: draft.status,
                credit_card_id: draft.credit_card_id,
                invoice_id: draft.invoice_id,
                installment_number: draft.installment_number,
                expense_date: draft.expense_date,
            };
            state.expenses.insert(expense.id, expense.clone());
            created.push(expense);
        }

        Ok(created)
    }

    fn list_expenses_by_invoice(&self, id: InvoiceId) -> Result<Vec<Expense>> {
        let state = self.lock()?;
        let mut expenses: Vec<Expense> = state
            .expenses
            .values()
            .filter(|e| e.invoice_id == Some(id))
            .cloned()
            .collect();
        expenses.sort_by_key(|e| (e.expense_date, e.installment_number));
        Ok(expenses)
    }

    fn find_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        Ok(self.lock()?.expenses.get(&id).cloned())
    }

    fn set_expense_status(&self, id: ExpenseId, status: ExpenseStatus) -> Result<Expense> {
        let mut state = self.lock()?;
        let expense = state
            .expenses
            .get_mut(&id)
            .ok_or(BillingError::ExpenseNotFound { id })?;

        expense.status = status;
        Ok(expense.clone())
    }
}
