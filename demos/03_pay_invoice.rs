/// pay invoice - settle a statement and roll the next cycle forward
use card_billing_rs::chrono::{TimeZone, Utc};
use card_billing_rs::{
    AllocationEngine, Bank, BillingStore, CreditCard, ExpenseCategory, ExpenseInput, ExpenseType,
    InvoiceLifecycle, InvoiceStatus, MemoryStore, Money, SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
    ));

    let card = CreditCard::new("everyday", Bank::Itau, Money::from_major(6_000), 10, 17)?;
    store.insert_card(card.clone())?;

    // one purchase in march's cycle, one installment pair reaching april
    let mut engine = AllocationEngine::new(&store);
    let purchase = ExpenseInput {
        name: "streaming".to_string(),
        price: Money::from_str_exact("39.90")?,
        expense_type: ExpenseType::Subscription,
        category: Some(ExpenseCategory::Entertainment),
        credit_card_id: Some(card.id),
        installments: None,
        expense_date: time.now().date_naive(),
    };
    engine.allocate(purchase.clone(), &time)?;
    engine.allocate(
        ExpenseInput {
            name: "sofa".to_string(),
            price: Money::from_major(450),
            category: Some(ExpenseCategory::Housing),
            installments: Some(2),
            ..purchase
        },
        &time,
    )?;

    let march = store
        .find_invoice_by_cycle(card.id, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap().date_naive())?
        .expect("march invoice exists");
    println!("march total before payment: {}", march.current_amount);

    // the statement closed; pay it
    store.set_invoice_status(march.id, InvoiceStatus::Closed)?;
    let mut lifecycle = InvoiceLifecycle::new(&store);
    let report = lifecycle.pay_invoice(march.id)?;

    println!("settled {} expense(s)", report.settled.len());
    if let Some(next_id) = report.rolled_forward {
        let next = store.find_invoice(next_id)?.expect("promoted invoice exists");
        println!(
            "next cycle (closing {}) is now {:?} with {} already accrued",
            next.closing_date, next.status, next.current_amount
        );
    }

    Ok(())
}
