/// single expense - record one card purchase and inspect its invoice
use card_billing_rs::{
    AllocationEngine, AllocationOutcome, Bank, BillingStore, CreditCard, ExpenseCategory,
    ExpenseInput, ExpenseType, MemoryStore, Money, SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    let time = SafeTimeProvider::new(TimeSource::System);

    // a card closing on the 10th, due on the 17th
    let card = CreditCard::new("everyday", Bank::Nubank, Money::from_major(8_000), 10, 17)?;
    store.insert_card(card.clone())?;

    let mut engine = AllocationEngine::new(&store);
    let outcome = engine.allocate(
        ExpenseInput {
            name: "groceries".to_string(),
            price: Money::from_str_exact("245.90")?,
            expense_type: ExpenseType::Fixed,
            category: Some(ExpenseCategory::Food),
            credit_card_id: Some(card.id),
            installments: None,
            expense_date: time.now().date_naive(),
        },
        &time,
    )?;

    let AllocationOutcome::Expense(expense) = outcome else {
        unreachable!("no installments were requested");
    };

    let invoice = store
        .find_invoice(expense.invoice_id.unwrap())?
        .expect("the allocation created this invoice");

    println!("expense: {} ({})", expense.name, expense.price);
    println!("invoice closes {} and is due {}", invoice.closing_date, invoice.due_date);
    println!("invoice status: {:?}, running total: {}", invoice.status, invoice.current_amount);

    Ok(())
}
