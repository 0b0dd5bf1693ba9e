pub mod allocation;
pub mod calendar;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod invoice;
pub mod store;
pub mod types;

// re-export key types
pub use allocation::{pay_expense, AllocationEngine, AllocationOutcome, ExpenseInput};
pub use calendar::{cycle_of, next_business_day, BillingCycle};
pub use decimal::Money;
pub use errors::{BillingError, Result};
pub use events::{BillingEvent, EventStore};
pub use invoice::{InvoiceLifecycle, PaymentReport, SettlementFailure};
pub use store::{BillingStore, MemoryStore};
pub use types::{
    Bank, CardId, CreditCard, Expense, ExpenseCategory, ExpenseDraft, ExpenseId, ExpenseStatus,
    ExpenseType, Invoice, InvoiceDraft, InvoiceId, InvoiceStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
