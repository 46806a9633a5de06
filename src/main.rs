use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use polars::prelude::*;
use retail_warehouse::analytics::{self, rfm, views, DiscountBaseline, RfmEngine};
use retail_warehouse::forecast::ForecastAdapter;
use retail_warehouse::{DashboardConfig, DashboardFilter, EtlPipeline, QueryGateway};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retail-warehouse")]
#[command(about = "Retail analytics warehouse: star-schema ETL, KPIs, RFM, insights and forecasting")]
struct Cli {
    /// Flat source dataset (overrides RETAIL_SOURCE_PATH)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// SQLite warehouse file (overrides RETAIL_WAREHOUSE_PATH)
    #[arg(long, global = true)]
    warehouse: Option<PathBuf>,

    /// Query cache TTL in seconds, 0 disables caching (overrides RETAIL_CACHE_TTL_SECS)
    #[arg(long, global = true)]
    cache_ttl: Option<u64>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Order year, repeatable
    #[arg(long = "year")]
    years: Vec<i32>,

    /// Region, repeatable
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Customer segment, repeatable
    #[arg(long = "segment")]
    segments: Vec<String>,
}

impl From<FilterArgs> for DashboardFilter {
    fn from(args: FilterArgs) -> Self {
        DashboardFilter {
            years: args.years,
            regions: args.regions,
            segments: args.segments,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the warehouse from the source dataset
    Etl,
    /// Headline KPIs
    Kpis(FilterArgs),
    /// RFM customer segmentation
    Rfm {
        /// Per-segment rollup instead of the customer table
        #[arg(long)]
        summary: bool,
    },
    /// Rule-based business insights
    Insights(FilterArgs),
    /// Monthly sales trend
    Trend(FilterArgs),
    /// Sales by category and customer segment
    Categories(FilterArgs),
    /// Profit by region
    Regions(FilterArgs),
    /// Sales by market
    Markets(FilterArgs),
    /// Sales, profit and margin per sub-category
    Subcategories,
    /// Shipping lead times and cost
    Shipping,
    /// Monthly sales forecast with backtest error
    Forecast {
        /// Months to project (overrides RETAIL_FORECAST_PERIODS)
        #[arg(long)]
        periods: Option<usize>,
    },
    /// Discount what-if scenario
    Simulate {
        /// Average discount to simulate, in percent
        #[arg(long)]
        discount: f64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_frame(mut df: DataFrame, json: bool) -> Result<()> {
    if json {
        JsonWriter::new(std::io::stdout())
            .with_json_format(JsonFormat::Json)
            .finish(&mut df)?;
        println!();
    } else {
        println!("{}", df);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = DashboardConfig::from_env()?
        .with_source_path(cli.source)
        .with_warehouse_path(cli.warehouse)
        .with_cache_ttl_secs(cli.cache_ttl);
    let json = cli.json;

    if let Command::Etl = cli.command {
        let report = EtlPipeline::new(&config.source_path, &config.warehouse_path).run()?;
        if json {
            print_json(&report)?;
        } else {
            println!("Run {}", report.run_id);
            println!("Rows read: {}, rejected: {}", report.rows_read, report.rows_rejected);
            for (table, count) in &report.table_counts {
                println!("  {:<16} {:>8}", table, count);
            }
            println!("Warehouse: {}", report.warehouse_path.display());
        }
        return Ok(());
    }

    let gateway = QueryGateway::from_config(&config)?;

    match cli.command {
        Command::Etl => {}
        Command::Kpis(filter) => {
            let kpis = gateway.kpis_filtered(&filter.into())?;
            if json {
                print_json(&kpis)?;
            } else {
                println!("Total sales:      {:>14.2}", kpis.total_sales);
                println!("Total profit:     {:>14.2}", kpis.total_profit);
                println!("Profit margin:    {:>13.2}%", kpis.profit_margin);
                println!("Total orders:     {:>14}", kpis.total_orders);
                println!("Total customers:  {:>14}", kpis.total_customers);
                println!("Avg order value:  {:>14.2}", kpis.avg_order_value);
            }
        }
        Command::Rfm { summary } => {
            let engine = RfmEngine::new(&gateway);
            let records = engine.compute()?;
            if summary {
                let rollup = rfm::summarize_segments(&records);
                if json {
                    print_json(&rollup)?;
                } else {
                    print_frame(rfm::segment_frame(&rollup)?, false)?;
                }
            } else if json {
                print_json(&records)?;
            } else {
                print_frame(rfm::rfm_frame(&records)?, false)?;
            }
        }
        Command::Insights(filter) => {
            let rows = analytics::load_insight_rows(&gateway, &filter.into())?;
            let insights = analytics::generate_insights(&rows);
            if json {
                print_json(&insights)?;
            } else {
                for insight in insights {
                    println!("- {}", insight);
                }
            }
        }
        Command::Trend(filter) => print_frame(views::monthly_sales_trend(&gateway, &filter.into())?, json)?,
        Command::Categories(filter) => {
            print_frame(views::sales_by_category_segment(&gateway, &filter.into())?, json)?
        }
        Command::Regions(filter) => print_frame(views::profit_by_region(&gateway, &filter.into())?, json)?,
        Command::Markets(filter) => print_frame(views::sales_by_market(&gateway, &filter.into())?, json)?,
        Command::Subcategories => print_frame(views::subcategory_financials(&gateway)?, json)?,
        Command::Shipping => {
            let ops = views::shipping_operations(&gateway)?;
            if json {
                print_json(&ops.summary)?;
            } else {
                println!("Avg shipping days:   {:.2}", ops.summary.avg_shipping_days);
                println!("Total shipping cost: {:.2}", ops.summary.total_shipping_cost);
                println!("Avg shipping cost:   {:.2}", ops.summary.avg_shipping_cost);
                print_frame(ops.by_region, false)?;
                print_frame(ops.by_ship_mode, false)?;
            }
        }
        Command::Forecast { periods } => {
            let periods = periods.unwrap_or(config.forecast_periods);
            let adapter = ForecastAdapter::monthly()?;
            let result = adapter.forecast(&gateway, periods)?;
            if json {
                print_json(&result)?;
            } else {
                match &result.forecast {
                    None => println!(
                        "Not enough history to forecast ({} months)",
                        result.history.len()
                    ),
                    Some(points) => {
                        println!("Model: {}  backtest MAPE: {:.2}%", adapter.model_name(), result.mape);
                        for p in points {
                            println!(
                                "  {}  {:>12.2}  [{:.2}, {:.2}]",
                                p.month.format("%Y-%m"),
                                p.yhat,
                                p.lower,
                                p.upper
                            );
                        }
                        println!("Projected total: {:.2}", result.projected_total());
                    }
                }
            }
        }
        Command::Simulate { discount } => {
            let baseline = DiscountBaseline::load(&gateway)?;
            let scenario = baseline.simulate(discount)?;
            if json {
                print_json(&scenario)?;
            } else {
                println!(
                    "Baseline: sales {:.2}, profit {:.2}, margin {:.2}% at {:.1}% avg discount",
                    baseline.sales,
                    baseline.profit,
                    baseline.margin_pct(),
                    baseline.avg_discount * 100.0
                );
                println!(
                    "Scenario: sales {:.2} ({:+.2}), profit {:.2} ({:+.2}), margin {:.2}% ({:+.2} pts)",
                    scenario.sales,
                    scenario.sales_delta,
                    scenario.profit,
                    scenario.profit_delta,
                    scenario.margin_pct,
                    scenario.margin_delta
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("🚀 retail-warehouse starting");

    if let Err(e) = run(cli) {
        error!("❌ {}", e);
        return Err(e);
    }
    Ok(())
}
