pub mod file;
pub mod stdin;

use clap::Args;
use retail_metrics_core::derivation::OrderLine;
use retail_metrics_core::dimensions::{CustomerRow, Dataset, ProductRow};

/// Where to read the order facts and reference tables from.
///
/// Either one dataset document (`--input`, JSON or YAML, or JSON on stdin)
/// or one CSV file per table.
#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Path to a dataset file with order_lines, products and customers (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,

    /// Order lines CSV (order_id,line_no,product_id,customer_id,order_date,quantity,...)
    #[arg(long, conflicts_with = "input")]
    pub orders: Option<String>,

    /// Products CSV (product_id,product_name,subcategory,category)
    #[arg(long, requires = "orders")]
    pub products: Option<String>,

    /// Customers CSV (customer_id,name,state,country,acquired_on)
    #[arg(long, requires = "orders")]
    pub customers: Option<String>,
}

pub fn load_dataset(args: &DatasetArgs) -> Result<Dataset, Box<dyn std::error::Error>> {
    let dataset = if let Some(path) = &args.input {
        file::read_structured(path)?
    } else if let Some(orders) = &args.orders {
        let order_lines: Vec<OrderLine> = file::read_csv(orders)?;
        let products: Vec<ProductRow> = match &args.products {
            Some(path) => file::read_csv(path)?,
            None => Vec::new(),
        };
        let customers: Vec<CustomerRow> = match &args.customers {
            Some(path) => file::read_csv(path)?,
            None => Vec::new(),
        };
        Dataset {
            order_lines,
            products,
            customers,
        }
    } else if let Some(data) = stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <dataset.json>, --orders <orders.csv> or stdin required".into());
    };

    tracing::debug!(
        order_lines = dataset.order_lines.len(),
        products = dataset.products.len(),
        customers = dataset.customers.len(),
        "dataset loaded"
    );
    Ok(dataset)
}
