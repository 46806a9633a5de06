use retail_warehouse::analytics::{self, views, RfmEngine, Segment};
use retail_warehouse::forecast::ForecastAdapter;
use retail_warehouse::warehouse::frame::{f64_values, i64_values, string_values};
use retail_warehouse::{DashboardFilter, EtlPipeline, QueryCache, QueryGateway, RetailError};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const HEADER: &str = "Row ID,Order ID,Order Date,Ship Date,Ship Mode,Customer ID,Customer Name,Segment,City,State,Country,Postal Code,Market,Region,Product ID,Category,Sub-Category,Product Name,Sales,Quantity,Discount,Profit,Shipping Cost,Order Priority";

/// Seven order lines: one has an unreadable order date, one ships before it
/// was ordered, and "FUR-1 " / "FUR-1" differ only by padding.
const ORDERS: &str = "\
1,O-1,05-01-2014,08-01-2014,Second Class,C-1,Ann Lee,Consumer,Paris,Ile-de-France,France,,EU,Central,\"FUR-1 \",Furniture,Chairs,Desk Chair,200,2,0,40,10,High
2,O-1,05-01-2014,08-01-2014,Second Class,C-1,Ann Lee,Consumer,Paris,Ile-de-France,France,,EU,Central,FUR-1,Furniture,Chairs,Desk Chair,100,1,0,20,5,High
3,O-2,10-02-2014,12-02-2014,First Class,C-2,Bo Berg,Corporate,Berlin,Berlin,Germany,,EU,Central,OFF-1,Office Supplies,Paper,Note Pad,50,10,0.5,-10,2,Low
4,O-3,15-03-2014,20-03-2014,Standard Class,C-1,Ann Lee,Consumer,Paris,Ile-de-France,France,,EU,Central,TEC-1,Technology,Phones,Handset,400,1,0.2,60,20,Medium
5,O-4,not-a-date,20-03-2014,Standard Class,C-3,Cy Ruiz,Home Office,Austin,Texas,United States,78701,US,West,TEC-1,Technology,Phones,Handset,999,1,0,99,9,Low
6,O-5,01-04-2015,03-04-2015,Same Day,C-3,Cy Ruiz,Home Office,Austin,Texas,United States,78701,US,West,FUR-2,Furniture,Tables,Side Table,250,5,0,30,15,Critical
7,O-5,01-04-2015,25-03-2015,Same Day,C-3,Cy Ruiz,Home Office,Austin,Texas,United States,78701,US,West,FUR-2,Furniture,Tables,Side Table,0,1,0,0,7,Critical
";

fn workspace() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("retail-warehouse-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_source(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("orders.csv");
    fs::write(&path, format!("{}\n{}", HEADER, body)).unwrap();
    path
}

fn build_warehouse() -> (PathBuf, QueryGateway) {
    let dir = workspace();
    let source = write_source(&dir, ORDERS);
    let target = dir.join("warehouse.db");
    EtlPipeline::new(&source, &target).run().unwrap();
    let gateway = QueryGateway::open(&target, QueryCache::disabled()).unwrap();
    (dir, gateway)
}

fn dump(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).unwrap();
    let mut rows = Vec::new();
    for sql in [
        "SELECT customer_id || '|' || customer_name || '|' || segment FROM dim_customers ORDER BY customer_id",
        "SELECT product_id || '|' || product_name || '|' || category || '|' || sub_category FROM dim_products ORDER BY product_id",
        "SELECT location_id || '|' || city || '|' || region || '|' || market FROM dim_locations ORDER BY location_id",
        "SELECT row_id || '|' || order_date || '|' || product_id || '|' || location_id || '|' || sales FROM fact_orders ORDER BY row_id",
    ] {
        let mut stmt = conn.prepare(sql).unwrap();
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows.extend(values);
    }
    rows
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn test_etl_builds_star_schema() {
    let dir = workspace();
    let source = write_source(&dir, ORDERS);
    let target = dir.join("warehouse.db");

    let report = EtlPipeline::new(&source, &target).run().unwrap();
    assert_eq!(report.rows_read, 7);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(report.table_counts["dim_customers"], 3);
    assert_eq!(report.table_counts["dim_products"], 4);
    assert_eq!(report.table_counts["dim_locations"], 3);
    assert_eq!(report.table_counts["fact_orders"], 6);
    assert!(!dir.join("warehouse.db.building").exists());

    let conn = Connection::open(&target).unwrap();
    let date: String = conn
        .query_row("SELECT order_date FROM fact_orders WHERE row_id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(date, "2014-01-05");

    let padded = count(&conn, "SELECT COUNT(*) FROM fact_orders WHERE product_id = 'FUR-1'");
    assert_eq!(padded, 2);

    let mut stmt = conn
        .prepare("SELECT location_id, city FROM dim_locations ORDER BY location_id")
        .unwrap();
    let locations: Vec<(i64, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        locations,
        vec![
            (1, "Paris".to_string()),
            (2, "Berlin".to_string()),
            (3, "Austin".to_string())
        ]
    );
}

#[test]
fn test_every_fact_resolves_its_dimensions() {
    let (dir, _) = build_warehouse();
    let conn = Connection::open(dir.join("warehouse.db")).unwrap();

    for sql in [
        "SELECT COUNT(*) FROM fact_orders f LEFT JOIN dim_customers c ON f.customer_id = c.customer_id WHERE c.customer_id IS NULL",
        "SELECT COUNT(*) FROM fact_orders f LEFT JOIN dim_products p ON f.product_id = p.product_id WHERE p.product_id IS NULL",
        "SELECT COUNT(*) FROM fact_orders f LEFT JOIN dim_locations l ON f.location_id = l.location_id WHERE l.location_id IS NULL",
    ] {
        assert_eq!(count(&conn, sql), 0, "{}", sql);
    }
}

#[test]
fn test_rebuild_is_deterministic() {
    let dir = workspace();
    let source = write_source(&dir, ORDERS);
    let first = dir.join("first.db");
    let second = dir.join("second.db");

    EtlPipeline::new(&source, &first).run().unwrap();
    EtlPipeline::new(&source, &second).run().unwrap();
    assert_eq!(dump(&first), dump(&second));

    // rebuilding over an existing warehouse replaces it wholesale
    EtlPipeline::new(&source, &first).run().unwrap();
    assert_eq!(dump(&first), dump(&second));
}

#[test]
fn test_missing_source_leaves_warehouse_untouched() {
    let dir = workspace();
    let target = dir.join("warehouse.db");

    let err = EtlPipeline::new(dir.join("absent.csv"), &target).run().unwrap_err();
    assert!(matches!(err, RetailError::SourceNotFound { .. }));
    assert!(!target.exists());

    let source = write_source(&dir, ORDERS);
    EtlPipeline::new(&source, &target).run().unwrap();
    let before = dump(&target);

    let err = EtlPipeline::new(dir.join("absent.csv"), &target).run().unwrap_err();
    assert!(matches!(err, RetailError::SourceNotFound { .. }));
    assert_eq!(dump(&target), before);
}

#[test]
fn test_blank_measures_load_as_null() {
    let dir = workspace();
    let source = write_source(
        &dir,
        "\
1,O-1,05-01-2014,08-01-2014,Second Class,C-1,Ann Lee,Consumer,Paris,Ile-de-France,France,,EU,Central,FUR-1,Furniture,Chairs,Desk Chair,100,1,0,20,10,High
2,O-2,06-01-2014,09-01-2014,Second Class,C-2,Bo Berg,Corporate,Berlin,Berlin,Germany,,EU,Central,OFF-1,Office Supplies,Paper,Note Pad,,2,0,5,,Low
",
    );
    let target = dir.join("warehouse.db");

    let report = EtlPipeline::new(&source, &target).run().unwrap();
    assert_eq!(report.rows_rejected, 0);
    assert_eq!(report.table_counts["fact_orders"], 2);

    let conn = Connection::open(&target).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM fact_orders WHERE sales IS NULL"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM fact_orders WHERE shipping_cost IS NULL"), 1);

    let gateway = QueryGateway::open(&target, QueryCache::disabled()).unwrap();
    let kpis = gateway.kpis().unwrap();
    assert!((kpis.total_sales - 100.0).abs() < 1e-9);
    assert!((kpis.total_profit - 25.0).abs() < 1e-9);
    assert_eq!(kpis.total_orders, 2);

    let ops = views::shipping_operations(&gateway).unwrap();
    assert!((ops.summary.total_shipping_cost - 10.0).abs() < 1e-9);
    assert!((ops.summary.avg_shipping_cost - 10.0).abs() < 1e-9);
}

#[test]
fn test_queries_require_a_warehouse() {
    let dir = workspace();
    let err = QueryGateway::open(dir.join("warehouse.db"), QueryCache::disabled()).unwrap_err();
    assert!(matches!(err, RetailError::StorageNotFound { .. }));
}

#[test]
fn test_headline_kpis() {
    let (_, gateway) = build_warehouse();
    let kpis = gateway.kpis().unwrap();

    assert!((kpis.total_sales - 1000.0).abs() < 1e-9);
    assert!((kpis.total_profit - 140.0).abs() < 1e-9);
    assert!((kpis.profit_margin - 14.0).abs() < 1e-9);
    assert_eq!(kpis.total_orders, 4);
    assert_eq!(kpis.total_customers, 3);
    assert!((kpis.avg_order_value - 250.0).abs() < 1e-9);
}

#[test]
fn test_filtered_kpis() {
    let (_, gateway) = build_warehouse();

    let by_year = gateway
        .kpis_filtered(&DashboardFilter {
            years: vec![2014],
            ..Default::default()
        })
        .unwrap();
    assert!((by_year.total_sales - 750.0).abs() < 1e-9);
    assert_eq!(by_year.total_orders, 3);
    assert_eq!(by_year.total_customers, 2);

    let west = gateway
        .kpis_filtered(&DashboardFilter {
            regions: vec!["West".to_string()],
            ..Default::default()
        })
        .unwrap();
    assert!((west.total_sales - 250.0).abs() < 1e-9);
    assert_eq!(west.total_customers, 1);

    let nothing = gateway
        .kpis_filtered(&DashboardFilter {
            years: vec![2099],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(nothing.total_sales, 0.0);
    assert_eq!(nothing.profit_margin, 0.0);
    assert_eq!(nothing.avg_order_value, 0.0);
}

#[test]
fn test_filter_options() {
    let (_, gateway) = build_warehouse();
    let options = gateway.filter_options().unwrap();

    assert_eq!(options.years, vec![2014, 2015]);
    assert_eq!(options.regions, vec!["Central", "West"]);
    assert_eq!(options.segments, vec!["Consumer", "Corporate", "Home Office"]);
}

#[test]
fn test_cached_queries() {
    let dir = workspace();
    let source = write_source(&dir, ORDERS);
    let target = dir.join("warehouse.db");
    EtlPipeline::new(&source, &target).run().unwrap();

    let gateway = QueryGateway::open(&target, QueryCache::new(std::time::Duration::from_secs(60))).unwrap();
    let first = gateway.kpis().unwrap();
    assert!(!gateway.cache().is_empty());
    assert_eq!(gateway.kpis().unwrap(), first);

    let uncached = QueryGateway::open(&target, QueryCache::disabled()).unwrap();
    uncached.kpis().unwrap();
    assert!(uncached.cache().is_empty());
}

#[test]
fn test_rfm_end_to_end() {
    let (_, gateway) = build_warehouse();
    let records = RfmEngine::new(&gateway).compute().unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["C-1", "C-2", "C-3"]);

    let ann = &records[0];
    assert_eq!(ann.recency, 382);
    assert_eq!(ann.frequency, 2);
    assert!((ann.monetary - 700.0).abs() < 1e-9);
    assert_eq!(ann.rfm_score, "344");
    assert_eq!(ann.segment, Segment::Loyal);

    assert_eq!(records[1].recency, 415);
    assert_eq!(records[1].rfm_score, "111");
    assert_eq!(records[1].segment, Segment::Hibernating);

    assert_eq!(records[2].recency, 0);
    assert_eq!(records[2].rfm_score, "422");
    assert_eq!(records[2].segment, Segment::PotentialOther);

    let summary = RfmEngine::new(&gateway).segment_summary().unwrap();
    assert_eq!(summary.iter().map(|s| s.customers).sum::<usize>(), 3);
    let pct: f64 = summary.iter().map(|s| s.revenue_pct).sum();
    assert!((pct - 100.0).abs() < 1e-9);
}

#[test]
fn test_insights_end_to_end() {
    let (_, gateway) = build_warehouse();

    let rows = analytics::load_insight_rows(&gateway, &DashboardFilter::all()).unwrap();
    assert_eq!(rows.len(), 6);
    let insights = analytics::generate_insights(&rows);
    assert_eq!(
        insights,
        vec![
            "Moderate Profitability: The profit margin is at 14.0%. Consider reviewing discount strategies.".to_string(),
            "Category Performance: Furniture is the most profitable category, whereas Office Supplies generates the least profit.".to_string(),
            "Volume vs Value Mismatch: Paper has the highest sales volume but is currently yielding a negative profit. A pricing or cost review is highly recommended.".to_string(),
        ]
    );

    let corporate = DashboardFilter {
        segments: vec!["Corporate".to_string()],
        ..Default::default()
    };
    let rows = analytics::load_insight_rows(&gateway, &corporate).unwrap();
    let insights = analytics::generate_insights(&rows);
    assert_eq!(insights.len(), 3);
    assert!(insights[0].starts_with("Loss Warning"));
    assert!(insights[0].contains("(Margin: -20.0%)"));
    assert!(insights[1].contains("(50%)"));

    let empty = DashboardFilter {
        years: vec![2099],
        ..Default::default()
    };
    let rows = analytics::load_insight_rows(&gateway, &empty).unwrap();
    assert_eq!(
        analytics::generate_insights(&rows),
        vec!["No data available for the current filters.".to_string()]
    );
}

#[test]
fn test_aggregate_views() {
    let (_, gateway) = build_warehouse();
    let all = DashboardFilter::all();

    let trend = views::monthly_sales_trend(&gateway, &all).unwrap();
    assert_eq!(
        string_values(&trend, "month").unwrap(),
        vec!["2014-01", "2014-02", "2014-03", "2015-04"]
    );
    assert_eq!(f64_values(&trend, "sales").unwrap(), vec![300.0, 50.0, 400.0, 250.0]);

    let regions = views::profit_by_region(&gateway, &all).unwrap();
    assert_eq!(string_values(&regions, "region").unwrap(), vec!["West", "Central"]);
    assert_eq!(f64_values(&regions, "profit").unwrap(), vec![30.0, 110.0]);

    let markets = views::sales_by_market(&gateway, &all).unwrap();
    assert_eq!(string_values(&markets, "market").unwrap(), vec!["EU", "US"]);

    let categories = views::sales_by_category_segment(&gateway, &all).unwrap();
    assert_eq!(categories.height(), 4);

    let subcategories = views::subcategory_financials(&gateway).unwrap();
    let names = string_values(&subcategories, "sub_category").unwrap();
    assert_eq!(names.len(), 4);
    assert_eq!(names[2], "Tables");
    assert_eq!(names[3], "Paper");

    let orders = views::order_discount_impact(&gateway).unwrap();
    assert_eq!(string_values(&orders, "order_id").unwrap(), vec!["O-1", "O-2", "O-3", "O-5"]);
}

#[test]
fn test_shipping_operations_drop_impossible_lead_times() {
    let (_, gateway) = build_warehouse();
    let ops = views::shipping_operations(&gateway).unwrap();

    assert!((ops.summary.avg_shipping_days - 3.0).abs() < 1e-9);
    assert!((ops.summary.total_shipping_cost - 52.0).abs() < 1e-9);
    assert!((ops.summary.avg_shipping_cost - 10.4).abs() < 1e-9);

    assert_eq!(
        string_values(&ops.by_ship_mode, "ship_mode").unwrap(),
        vec!["First Class", "Same Day", "Second Class", "Standard Class"]
    );
    assert_eq!(i64_values(&ops.by_ship_mode, "order_lines").unwrap(), vec![1, 1, 2, 1]);
    assert_eq!(string_values(&ops.by_region, "region").unwrap(), vec!["West", "Central"]);
}

#[test]
fn test_forecast_needs_a_year_of_history() {
    let (_, gateway) = build_warehouse();
    let result = ForecastAdapter::monthly().unwrap().forecast(&gateway, 3).unwrap();

    assert_eq!(result.history.len(), 4);
    assert!(result.forecast.is_none());
    assert_eq!(result.mape, 0.0);
}

#[test]
fn test_forecast_over_two_years() {
    let dir = workspace();
    let mut body = String::new();
    for i in 0..26 {
        let year = 2012 + i / 12;
        let month = i % 12 + 1;
        body.push_str(&format!(
            "{row},O-{row},15-{month:02}-{year},18-{month:02}-{year},Standard Class,C-1,Ann Lee,Consumer,Paris,Ile-de-France,France,,EU,Central,FUR-1,Furniture,Chairs,Desk Chair,{sales},1,0,10,1,Low\n",
            row = i + 1,
            month = month,
            year = year,
            sales = 100 + 10 * i
        ));
    }
    let source = write_source(&dir, &body);
    let target = dir.join("warehouse.db");
    EtlPipeline::new(&source, &target).run().unwrap();
    let gateway = QueryGateway::open(&target, QueryCache::disabled()).unwrap();

    let result = ForecastAdapter::monthly().unwrap().forecast(&gateway, 3).unwrap();
    assert_eq!(result.history.len(), 26);
    assert!(result.mape < 1e-6);

    let forecast = result.forecast.unwrap();
    assert_eq!(forecast.len(), 3);
    assert_eq!(forecast[0].month.to_string(), "2014-03-01");
    for point in &forecast {
        assert!(point.lower <= point.yhat && point.yhat <= point.upper);
    }
}
