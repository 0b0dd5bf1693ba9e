use chrono::{Datelike, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::{cycle_closing_date, cycle_due_date, cycle_of, next_cycle_anchor, BillingCycle};
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{BillingEvent, EventStore};
use crate::store::BillingStore;
use crate::types::{CreditCard, ExpenseId, ExpenseStatus, Invoice, InvoiceDraft, InvoiceId, InvoiceStatus};

/// outcome of paying an invoice
///
/// expense settlement is best-effort per row; failures are reported here
/// rather than aborting the payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReport {
    pub invoice_id: InvoiceId,
    pub settled: Vec<ExpenseId>,
    pub failures: Vec<SettlementFailure>,
    /// next cycle's invoice promoted to `OpenedCurrent`, when one existed
    pub rolled_forward: Option<InvoiceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementFailure {
    pub expense_id: ExpenseId,
    pub message: String,
}

/// owns invoice creation and the pay-invoice state transition
pub struct InvoiceLifecycle<'a, S: BillingStore> {
    store: &'a S,
    pub events: EventStore,
}

impl<'a, S: BillingStore> InvoiceLifecycle<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            events: EventStore::new(),
        }
    }

    /// resolve the invoice for the cycle `anchor_date` falls into, creating
    /// it if this is the cycle's first expense, and accrue `amount` into it
    pub fn resolve_or_create(
        &mut self,
        card: &CreditCard,
        anchor_date: NaiveDate,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<Invoice> {
        let cycle = cycle_of(card.closing_day, anchor_date);
        let closing_date = cycle_closing_date(cycle, card.closing_day)?;

        if let Some(existing) = self.store.find_invoice_by_cycle(card.id, closing_date)? {
            return self.accrue(existing, amount);
        }

        let today = time_provider.now().date_naive();
        let draft = InvoiceDraft {
            credit_card_id: card.id,
            closing_date,
            due_date: cycle_due_date(cycle, card.closing_day, card.due_day)?,
            status: classify_status(cycle, card.closing_day, today),
            initial_amount: amount,
        };

        match self.store.create_invoice(draft) {
            Ok(invoice) => {
                self.events.emit(BillingEvent::InvoiceOpened {
                    invoice_id: invoice.id,
                    credit_card_id: card.id,
                    closing_date: invoice.closing_date,
                    due_date: invoice.due_date,
                    status: invoice.status,
                    initial_amount: amount,
                });
                Ok(invoice)
            }
            Err(BillingError::DuplicateCycle { .. }) => {
                // lost the creation race; accrue into the winner's row
                let existing = self
                    .store
                    .find_invoice_by_cycle(card.id, closing_date)?
                    .ok_or(BillingError::CycleNotFound {
                        card_id: card.id,
                        closing_date,
                    })?;
                self.accrue(existing, amount)
            }
            Err(err) => Err(err),
        }
    }

    fn accrue(&mut self, invoice: Invoice, amount: Money) -> Result<Invoice> {
        if invoice.status == InvoiceStatus::Closed {
            return Err(BillingError::InvoiceClosed { id: invoice.id });
        }

        // the store re-checks the closed status under its own lock
        let updated = self.store.increment_invoice_amount(invoice.id, amount)?;
        self.events.emit(BillingEvent::InvoiceAccrued {
            invoice_id: updated.id,
            amount,
            new_total: updated.current_amount,
        });
        Ok(updated)
    }

    /// pay an invoice: mark it paid, settle its expenses, and promote the
    /// next cycle's invoice to the actively accruing one
    pub fn pay_invoice(&mut self, id: InvoiceId) -> Result<PaymentReport> {
        let invoice = self
            .store
            .find_invoice(id)?
            .ok_or(BillingError::InvoiceNotFound { id })?;
        let card = self
            .store
            .find_credit_card(invoice.credit_card_id)?
            .ok_or(BillingError::CreditCardNotFound {
                id: invoice.credit_card_id,
            })?;

        self.store.set_invoice_status(id, InvoiceStatus::Paid)?;

        // best-effort cascade; each expense settles independently
        let mut settled = Vec::new();
        let mut failures = Vec::new();
        for expense in self.store.list_expenses_by_invoice(id)? {
            match self.store.set_expense_status(expense.id, ExpenseStatus::Paid) {
                Ok(_) => {
                    settled.push(expense.id);
                    self.events.emit(BillingEvent::ExpenseSettled {
                        expense_id: expense.id,
                    });
                }
                Err(err) => {
                    warn!(
                        expense_id = %expense.id,
                        invoice_id = %id,
                        error = %err,
                        "failed to settle expense during invoice payment"
                    );
                    self.events.emit(BillingEvent::ExpenseSettlementFailed {
                        expense_id: expense.id,
                        message: err.to_string(),
                    });
                    failures.push(SettlementFailure {
                        expense_id: expense.id,
                        message: err.to_string(),
                    });
                }
            }
        }

        // the day before the next closing always lands in the next cycle
        let probe = next_cycle_anchor(invoice.closing_date)?;
        let next_closing = cycle_closing_date(cycle_of(card.closing_day, probe), card.closing_day)?;

        let rolled_forward = match self.store.find_invoice_by_cycle(card.id, next_closing)? {
            Some(next) => {
                self.store.set_invoice_status(next.id, InvoiceStatus::OpenedCurrent)?;
                self.events.emit(BillingEvent::CycleRolledForward {
                    credit_card_id: card.id,
                    invoice_id: next.id,
                    closing_date: next.closing_date,
                });
                Some(next.id)
            }
            // not created yet; its first expense will classify it
            None => None,
        };

        self.events.emit(BillingEvent::InvoicePaid {
            invoice_id: id,
            settled_expenses: settled.len() as u32,
            failed_expenses: failures.len() as u32,
        });

        Ok(PaymentReport {
            invoice_id: id,
            settled,
            failures,
            rolled_forward,
        })
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        self.events.take_events()
    }
}

/// initial status of a freshly created invoice, relative to today
///
/// cycles in past months are born `Paid`; the current and upcoming cycle
/// open as accruing, strictly later cycles open as future.
fn classify_status(cycle: BillingCycle, closing_day: u8, today: NaiveDate) -> InvoiceStatus {
    let mut status = InvoiceStatus::Paid;

    if (cycle.year, cycle.month) > (today.year(), today.month()) {
        status = InvoiceStatus::OpenedFuture;
    }

    let same_year = cycle.year == today.year();
    let before_closing = today.day() < u32::from(closing_day);
    let this_or_next_month = cycle.month == today.month() || cycle.month == today.month() + 1;

    if same_year && before_closing && this_or_next_month {
        status = InvoiceStatus::OpenedCurrent;
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Bank, CardId, ExpenseDraft, ExpenseType};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock(y: i32, m: u32, d: u32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        ))
    }

    fn card(closing_day: u8, due_day: u8) -> CreditCard {
        CreditCard::new("test card", Bank::Nubank, Money::from_major(5_000), closing_day, due_day)
            .unwrap()
    }

    fn cycle(month: u32, year: i32) -> BillingCycle {
        BillingCycle { month, year }
    }

    #[test]
    fn test_classify_future_cycle() {
        let today = date(2024, 3, 5);
        assert_eq!(classify_status(cycle(6, 2024), 10, today), InvoiceStatus::OpenedFuture);
        assert_eq!(classify_status(cycle(1, 2025), 10, today), InvoiceStatus::OpenedFuture);
    }

    #[test]
    fn test_classify_current_cycle() {
        // before this month's closing, this month's cycle is the accruing one
        let today = date(2024, 3, 5);
        assert_eq!(classify_status(cycle(3, 2024), 10, today), InvoiceStatus::OpenedCurrent);
        // the upcoming cycle also counts as accruing while the closing is ahead
        assert_eq!(classify_status(cycle(4, 2024), 10, today), InvoiceStatus::OpenedCurrent);
    }

    #[test]
    fn test_retroactive_cycle_defaults_to_paid() {
        // past cycles are born `Paid` even though nothing settled them; the
        // value doubles as a closed-but-unpaid placeholder at creation time
        let today = date(2024, 3, 5);
        assert_eq!(classify_status(cycle(1, 2024), 10, today), InvoiceStatus::Paid);
        assert_eq!(classify_status(cycle(12, 2023), 10, today), InvoiceStatus::Paid);
    }

    #[test]
    fn test_first_expense_opens_invoice_with_dates() {
        let store = MemoryStore::new();
        let card = card(10, 5);
        store.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let invoice = lifecycle
            .resolve_or_create(&card, date(2024, 3, 15), Money::from_major(200), &time)
            .unwrap();

        // purchase after the closing day lands in april's cycle
        assert_eq!(invoice.closing_date, date(2024, 4, 10));
        // due day 5 < closing day 10, so payment is in may; may 5 2024 is a
        // sunday and rolls to monday the 6th
        assert_eq!(invoice.due_date, date(2024, 5, 6));
        assert_eq!(invoice.current_amount, Money::from_major(200));
        assert_eq!(invoice.status, InvoiceStatus::OpenedCurrent);
    }

    #[test]
    fn test_same_cycle_expenses_share_one_invoice() {
        let store = MemoryStore::new();
        let card = card(10, 17);
        store.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let first = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(100), &time)
            .unwrap();
        let second = lifecycle
            .resolve_or_create(&card, date(2024, 3, 7), Money::from_str_exact("50.50").unwrap(), &time)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.current_amount, Money::from_str_exact("150.50").unwrap());
    }

    #[test]
    fn test_accrual_rejected_on_closed_invoice() {
        let store = MemoryStore::new();
        let card = card(10, 17);
        store.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let invoice = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(100), &time)
            .unwrap();
        store.set_invoice_status(invoice.id, InvoiceStatus::Closed).unwrap();

        let err = lifecycle
            .resolve_or_create(&card, date(2024, 3, 7), Money::from_major(10), &time)
            .unwrap_err();
        assert_eq!(err, BillingError::InvoiceClosed { id: invoice.id });
    }

    /// store whose first cycle lookup misses, simulating a concurrent
    /// first-expense creating the invoice between lookup and insert
    struct FirstLookupMisses {
        inner: MemoryStore,
        missed: AtomicBool,
    }

    impl BillingStore for FirstLookupMisses {
        fn find_credit_card(&self, id: CardId) -> Result<Option<CreditCard>> {
            self.inner.find_credit_card(id)
        }
        fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
            self.inner.find_invoice(id)
        }
        fn find_invoice_by_cycle(&self, card_id: CardId, closing_date: NaiveDate) -> Result<Option<Invoice>> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_invoice_by_cycle(card_id, closing_date)
        }
        fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice> {
            self.inner.create_invoice(draft)
        }
        fn increment_invoice_amount(&self, id: InvoiceId, delta: Money) -> Result<Invoice> {
            self.inner.increment_invoice_amount(id, delta)
        }
        fn set_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
            self.inner.set_invoice_status(id, status)
        }
        fn create_expenses(&self, drafts: Vec<ExpenseDraft>) -> Result<Vec<crate::types::Expense>> {
            self.inner.create_expenses(drafts)
        }
        fn list_expenses_by_invoice(&self, id: InvoiceId) -> Result<Vec<crate::types::Expense>> {
            self.inner.list_expenses_by_invoice(id)
        }
        fn find_expense(&self, id: ExpenseId) -> Result<Option<crate::types::Expense>> {
            self.inner.find_expense(id)
        }
        fn set_expense_status(&self, id: ExpenseId, status: ExpenseStatus) -> Result<crate::types::Expense> {
            self.inner.set_expense_status(id, status)
        }
    }

    #[test]
    fn test_lost_creation_race_retries_as_accrual() {
        let store = FirstLookupMisses {
            inner: MemoryStore::new(),
            missed: AtomicBool::new(false),
        };
        let card = card(10, 17);
        store.inner.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        // the racing request already created this cycle's invoice
        store
            .inner
            .create_invoice(InvoiceDraft {
                credit_card_id: card.id,
                closing_date: date(2024, 3, 10),
                due_date: date(2024, 3, 18),
                status: InvoiceStatus::OpenedCurrent,
                initial_amount: Money::from_major(30),
            })
            .unwrap();

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let invoice = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(70), &time)
            .unwrap();

        assert_eq!(invoice.current_amount, Money::from_major(100));
    }

    #[test]
    fn test_pay_invoice_cascades_and_rolls_forward() {
        let store = MemoryStore::new();
        let card = card(10, 17);
        store.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let march = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(100), &time)
            .unwrap();
        let april = lifecycle
            .resolve_or_create(&card, date(2024, 3, 20), Money::from_major(40), &time)
            .unwrap();
        assert_ne!(march.id, april.id);

        let expenses = store
            .create_expenses(vec![
                ExpenseDraft {
                    name: "internet".to_string(),
                    price: Money::from_major(100),
                    expense_type: ExpenseType::Fixed,
                    category: None,
                    status: ExpenseStatus::Pending,
                    credit_card_id: Some(card.id),
                    invoice_id: Some(march.id),
                    installment_number: None,
                    expense_date: date(2024, 3, 2),
                },
            ])
            .unwrap();

        store.set_invoice_status(march.id, InvoiceStatus::Closed).unwrap();
        let report = lifecycle.pay_invoice(march.id).unwrap();

        assert_eq!(report.invoice_id, march.id);
        assert_eq!(report.settled, vec![expenses[0].id]);
        assert!(report.failures.is_empty());
        assert_eq!(report.rolled_forward, Some(april.id));

        let paid = store.find_invoice(march.id).unwrap().unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        let promoted = store.find_invoice(april.id).unwrap().unwrap();
        assert_eq!(promoted.status, InvoiceStatus::OpenedCurrent);
        let expense = store.find_expense(expenses[0].id).unwrap().unwrap();
        assert_eq!(expense.status, ExpenseStatus::Paid);
    }

    #[test]
    fn test_pay_invoice_without_next_cycle_is_fine() {
        let store = MemoryStore::new();
        let card = card(10, 17);
        store.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&store);
        let invoice = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(100), &time)
            .unwrap();

        let report = lifecycle.pay_invoice(invoice.id).unwrap();
        assert_eq!(report.rolled_forward, None);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_pay_invoice_unknown_id() {
        let store = MemoryStore::new();
        let mut lifecycle = InvoiceLifecycle::new(&store);
        let id = uuid::Uuid::new_v4();

        let err = lifecycle.pay_invoice(id).unwrap_err();
        assert_eq!(err, BillingError::InvoiceNotFound { id });
    }

    /// store that refuses to settle one chosen expense
    struct RefusesOneSettlement {
        inner: MemoryStore,
        poison: ExpenseId,
    }

    impl BillingStore for RefusesOneSettlement {
        fn find_credit_card(&self, id: CardId) -> Result<Option<CreditCard>> {
            self.inner.find_credit_card(id)
        }
        fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
            self.inner.find_invoice(id)
        }
        fn find_invoice_by_cycle(&self, card_id: CardId, closing_date: NaiveDate) -> Result<Option<Invoice>> {
            self.inner.find_invoice_by_cycle(card_id, closing_date)
        }
        fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice> {
            self.inner.create_invoice(draft)
        }
        fn increment_invoice_amount(&self, id: InvoiceId, delta: Money) -> Result<Invoice> {
            self.inner.increment_invoice_amount(id, delta)
        }
        fn set_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
            self.inner.set_invoice_status(id, status)
        }
        fn create_expenses(&self, drafts: Vec<ExpenseDraft>) -> Result<Vec<crate::types::Expense>> {
            self.inner.create_expenses(drafts)
        }
        fn list_expenses_by_invoice(&self, id: InvoiceId) -> Result<Vec<crate::types::Expense>> {
            self.inner.list_expenses_by_invoice(id)
        }
        fn find_expense(&self, id: ExpenseId) -> Result<Option<crate::types::Expense>> {
            self.inner.find_expense(id)
        }
        fn set_expense_status(&self, id: ExpenseId, status: ExpenseStatus) -> Result<crate::types::Expense> {
            if id == self.poison {
                return Err(BillingError::Store {
                    message: "write timed out".to_string(),
                });
            }
            self.inner.set_expense_status(id, status)
        }
    }

    #[test]
    fn test_settlement_failures_are_reported_not_fatal() {
        let inner = MemoryStore::new();
        let card = card(10, 17);
        inner.insert_card(card.clone()).unwrap();
        let time = clock(2024, 3, 5);

        let mut lifecycle = InvoiceLifecycle::new(&inner);
        let invoice = lifecycle
            .resolve_or_create(&card, date(2024, 3, 2), Money::from_major(60), &time)
            .unwrap();

        let draft = ExpenseDraft {
            name: "cinema".to_string(),
            price: Money::from_major(30),
            expense_type: ExpenseType::Casual,
            category: None,
            status: ExpenseStatus::Pending,
            credit_card_id: Some(card.id),
            invoice_id: Some(invoice.id),
            installment_number: None,
            expense_date: date(2024, 3, 2),
        };
        let expenses = inner.create_expenses(vec![draft.clone(), draft]).unwrap();

        let store = RefusesOneSettlement {
            inner,
            poison: expenses[1].id,
        };
        let mut lifecycle = InvoiceLifecycle::new(&store);
        let report = lifecycle.pay_invoice(invoice.id).unwrap();

        assert_eq!(report.settled, vec![expenses[0].id]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].expense_id, expenses[1].id);

        // the invoice payment itself still went through
        let paid = store.inner.find_invoice(invoice.id).unwrap().unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
    }
}
