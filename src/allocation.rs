use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, warn};

use crate::calendar::next_cycle_anchor;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{BillingEvent, EventStore};
use crate::invoice::InvoiceLifecycle;
use crate::store::BillingStore;
use crate::types::{
    CardId, CreditCard, Expense, ExpenseCategory, ExpenseDraft, ExpenseId, ExpenseStatus,
    ExpenseType, Invoice,
};

/// a "record expense" command
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseInput {
    pub name: String,
    pub price: Money,
    pub expense_type: ExpenseType,
    pub category: Option<ExpenseCategory>,
    pub credit_card_id: Option<CardId>,
    /// `None` or `Some(0)` means a plain expense; 1 is rejected
    pub installments: Option<u32>,
    pub expense_date: NaiveDate,
}

/// what an allocation produced
///
/// installment batches acknowledge the count instead of returning rows;
/// callers branch on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationOutcome {
    /// the single recorded expense
    Expense(Expense),
    /// an installment batch was committed
    Installments { count: u32 },
}

/// walks an expense's installments across monthly cycles, resolving or
/// creating the invoice each one accrues into
pub struct AllocationEngine<'a, S: BillingStore> {
    store: &'a S,
    pub events: EventStore,
}

impl<'a, S: BillingStore> AllocationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            events: EventStore::new(),
        }
    }

    /// record an expense, allocating installments to their cycles
    pub fn allocate(
        &mut self,
        input: ExpenseInput,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationOutcome> {
        let input = validate(input)?;

        let Some(card_id) = input.credit_card_id else {
            return self.record_standalone(input);
        };

        let card = self
            .store
            .find_credit_card(card_id)?
            .ok_or(BillingError::CreditCardNotFound { id: card_id })?;

        match input.installments {
            Some(count) => self.allocate_installments(&card, input, count, time_provider),
            None => self.record_card_expense(&card, input, time_provider),
        }
    }

    /// no card attached: a standalone row with no cycle logic
    fn record_standalone(&mut self, input: ExpenseInput) -> Result<AllocationOutcome> {
        let draft = ExpenseDraft {
            name: input.name,
            price: input.price,
            expense_type: input.expense_type,
            category: input.category,
            status: ExpenseStatus::Pending,
            credit_card_id: None,
            invoice_id: None,
            installment_number: None,
            expense_date: input.expense_date,
        };

        let expense = self.create_single(draft)?;
        self.events.emit(BillingEvent::ExpenseRecorded {
            expense_id: expense.id,
            invoice_id: None,
            amount: expense.price,
        });
        Ok(AllocationOutcome::Expense(expense))
    }

    fn record_card_expense(
        &mut self,
        card: &CreditCard,
        input: ExpenseInput,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationOutcome> {
        let mut lifecycle = InvoiceLifecycle::new(self.store);
        let invoice =
            lifecycle.resolve_or_create(card, input.expense_date, input.price, time_provider)?;
        self.events.extend(lifecycle.take_events());

        let draft = ExpenseDraft {
            name: input.name,
            price: input.price,
            expense_type: input.expense_type,
            category: input.category,
            status: ExpenseStatus::Pending,
            credit_card_id: Some(card.id),
            invoice_id: Some(invoice.id),
            installment_number: None,
            expense_date: input.expense_date,
        };

        match self.create_single(draft) {
            Ok(expense) => {
                debug!(expense_id = %expense.id, invoice_id = %invoice.id, "expense allocated");
                self.events.emit(BillingEvent::ExpenseRecorded {
                    expense_id: expense.id,
                    invoice_id: Some(invoice.id),
                    amount: expense.price,
                });
                Ok(AllocationOutcome::Expense(expense))
            }
            Err(err) => {
                self.unwind(std::slice::from_ref(&invoice), input.price);
                Err(err)
            }
        }
    }

    /// resolve one invoice per installment, then commit the rows as a batch
    fn allocate_installments(
        &mut self,
        card: &CreditCard,
        input: ExpenseInput,
        count: u32,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationOutcome> {
        let mut lifecycle = InvoiceLifecycle::new(self.store);
        let mut invoices: Vec<Invoice> = Vec::with_capacity(count as usize);

        for _ in 0..count {
            // installment 1 at the expense date, later ones the day before
            // the previous cycle's next closing
            let resolved = match invoices.last() {
                None => Ok(input.expense_date),
                Some(prev) => next_cycle_anchor(prev.closing_date),
            }
            .and_then(|anchor| lifecycle.resolve_or_create(card, anchor, input.price, time_provider));

            match resolved {
                Ok(invoice) => invoices.push(invoice),
                Err(err) => {
                    self.events.extend(lifecycle.take_events());
                    self.unwind(&invoices, input.price);
                    return Err(err);
                }
            }
        }
        self.events.extend(lifecycle.take_events());

        let drafts: Vec<ExpenseDraft> = invoices
            .iter()
            .enumerate()
            .map(|(index, invoice)| ExpenseDraft {
                name: input.name.clone(),
                price: input.price,
                expense_type: input.expense_type,
                category: input.category,
                status: ExpenseStatus::Pending,
                credit_card_id: Some(card.id),
                invoice_id: Some(invoice.id),
                installment_number: Some(index as u32 + 1),
                // installment rows are dated by their cycle, not the purchase
                expense_date: invoice.closing_date,
            })
            .collect();

        match self.store.create_expenses(drafts) {
            Ok(expenses) => {
                debug!(card_id = %card.id, count, "installments allocated");
                for expense in &expenses {
                    self.events.emit(BillingEvent::ExpenseRecorded {
                        expense_id: expense.id,
                        invoice_id: expense.invoice_id,
                        amount: expense.price,
                    });
                }
                self.events.emit(BillingEvent::InstallmentsAllocated {
                    credit_card_id: card.id,
                    installments: count,
                    installment_amount: input.price,
                });
                Ok(AllocationOutcome::Installments { count })
            }
            Err(err) => {
                self.unwind(&invoices, input.price);
                Err(err)
            }
        }
    }

    fn create_single(&mut self, draft: ExpenseDraft) -> Result<Expense> {
        self.store
            .create_expenses(vec![draft])?
            .pop()
            .ok_or(BillingError::Store {
                message: "expense batch returned no rows".to_string(),
            })
    }

    /// revert this allocation's accruals after an aborted batch
    fn unwind(&mut self, invoices: &[Invoice], amount: Money) {
        for invoice in invoices {
            match self.store.increment_invoice_amount(invoice.id, -amount) {
                Ok(_) => self.events.emit(BillingEvent::AllocationUnwound {
                    invoice_id: invoice.id,
                    amount,
                }),
                Err(err) => warn!(
                    invoice_id = %invoice.id,
                    error = %err,
                    "failed to unwind accrual after aborted allocation"
                ),
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        self.events.take_events()
    }
}

/// flip a pending expense to paid, bypassing invoice logic
pub fn pay_expense<S: BillingStore>(store: &S, id: ExpenseId) -> Result<Expense> {
    store
        .find_expense(id)?
        .ok_or(BillingError::ExpenseNotFound { id })?;
    store.set_expense_status(id, ExpenseStatus::Paid)
}

/// collect every violated precondition before touching the store
fn validate(input: ExpenseInput) -> Result<ExpenseInput> {
    let mut messages = Vec::new();

    if input.name.trim().is_empty() {
        messages.push("expense name must not be empty".to_string());
    }
    if !input.price.is_positive() {
        messages.push("expense price must be greater than zero".to_string());
    }

    let installments = match input.installments {
        // absent or zero means a plain expense
        None | Some(0) => None,
        Some(1) => {
            messages
                .push("installments must be at least 2; a single installment is a plain expense".to_string());
            None
        }
        Some(count) => Some(count),
    };

    if !messages.is_empty() {
        return Err(BillingError::InvalidExpense { messages });
    }

    Ok(ExpenseInput {
        installments,
        ..input
    })
}
