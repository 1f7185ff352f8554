use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, filter};

use expense_tracker::{
    client::{
        ExpenseClient, ExpenseFilters, ExpenseFormState, ExpenseListView, FormField, FormStatus,
        today,
    },
    expense::SortOrder,
};

/// Record and review expenses using the expense_tracker API.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The address of the expense_tracker API.
    #[arg(long, env = "EXPENSES_API_URL", default_value = "http://127.0.0.1:5000")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a new expense.
    Add {
        /// How much was spent, e.g. 25.50.
        #[arg(long)]
        amount: String,

        /// The category of the expense, e.g. Food.
        #[arg(long)]
        category: String,

        /// What the money was spent on.
        #[arg(long)]
        description: String,

        /// The date of the expense as YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// The idempotency key of an earlier attempt to record this expense.
        /// Reusing the key makes sure the expense is only recorded once.
        #[arg(long)]
        key: Option<String>,
    },

    /// List expenses and their total.
    List {
        /// Only list expenses in this category.
        #[arg(long)]
        category: Option<String>,

        /// The order to list expenses in: date_desc or date_asc.
        #[arg(long, default_value = "date_desc")]
        sort: SortOrder,
    },

    /// List the categories in use.
    Categories,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter::LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let client = match ExpenseClient::new(&args.base_url) {
        Ok(client) => client,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Add {
            amount,
            category,
            description,
            date,
            key,
        } => add_expense(&client, amount, category, description, date, key).await,
        Command::List { category, sort } => list_expenses(&client, category, sort).await,
        Command::Categories => list_categories(&client).await,
    }
}

async fn add_expense(
    client: &ExpenseClient,
    amount: String,
    category: String,
    description: String,
    date: Option<String>,
    key: Option<String>,
) -> ExitCode {
    let mut form = ExpenseFormState::new(today());
    form.set_field(FormField::Amount, amount);
    form.set_field(FormField::Category, category);
    form.set_field(FormField::Description, description);
    if let Some(date) = date {
        form.set_field(FormField::Date, date);
    }
    if let Some(key) = key {
        form.set_idempotency_key(key);
    }

    let key = form.idempotency_key().to_owned();

    match form.submit(client).await {
        Some(created) => {
            let expense = &created.expense;
            let verb = if created.created {
                "Saved"
            } else {
                "Already saved"
            };
            println!(
                "{verb} expense #{}: {} {} on {} ({})",
                expense.id, expense.amount, expense.category, expense.date, expense.description
            );
            ExitCode::SUCCESS
        }
        None => {
            for error in &form.errors().errors {
                eprintln!("{}: {}", error.field, error.message);
            }
            if let FormStatus::Error(message) = form.status() {
                eprintln!("{message}");
                eprintln!("Run the command again with --key {key} to retry without a duplicate.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn list_expenses(
    client: &ExpenseClient,
    category: Option<String>,
    sort: SortOrder,
) -> ExitCode {
    let mut view = ExpenseListView::new(ExpenseFilters::default());
    view.set_category(category);
    view.set_sort(sort);

    view.refresh(client).await;

    if let Some(error) = view.error() {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    println!(
        "{:<10}  {:<16}  {:>12}  Description",
        "Date", "Category", "Amount"
    );
    for expense in view.expenses() {
        println!(
            "{:<10}  {:<16}  {:>12}  {}",
            expense.date.to_string(),
            expense.category,
            expense.amount.to_string(),
            expense.description
        );
    }
    let total = match view.total() {
        Some(total) => total.to_string(),
        None => "too large to show".to_owned(),
    };
    println!();
    println!(
        "{} ({}): {total}",
        view.total_label(),
        view.count_label()
    );

    ExitCode::SUCCESS
}

async fn list_categories(client: &ExpenseClient) -> ExitCode {
    match client.get_categories().await {
        Ok(categories) => {
            for category in categories {
                println!("{category}");
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}", error.user_message());
            ExitCode::FAILURE
        }
    }
}
