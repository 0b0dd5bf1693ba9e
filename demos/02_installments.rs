/// installments - split a purchase across four monthly cycles
use card_billing_rs::chrono::{Datelike, TimeZone, Utc};
use card_billing_rs::{
    AllocationEngine, Bank, BillingStore, CreditCard, ExpenseCategory, ExpenseInput, ExpenseType,
    MemoryStore, Money, SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    // pin the clock so the cycle statuses are reproducible
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
    ));

    let card = CreditCard::new("travel", Bank::Inter, Money::from_major(12_000), 10, 17)?;
    store.insert_card(card.clone())?;

    let mut engine = AllocationEngine::new(&store);
    let outcome = engine.allocate(
        ExpenseInput {
            name: "flight tickets".to_string(),
            price: Money::from_str_exact("899.00")?,
            expense_type: ExpenseType::Casual,
            category: Some(ExpenseCategory::Travel),
            credit_card_id: Some(card.id),
            installments: Some(4),
            expense_date: time.now().date_naive(),
        },
        &time,
    )?;
    println!("allocated: {outcome:?}");

    // each cycle carries the full nominal price of its installment
    for event in engine.take_events() {
        println!("  {event:?}");
    }

    let closing = time.now().date_naive().with_day(10).unwrap();
    if let Some(invoice) = store.find_invoice_by_cycle(card.id, closing)? {
        println!("march invoice total: {}", invoice.current_amount);
    }

    Ok(())
}
