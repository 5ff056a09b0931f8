//! Simple least-squares regression over two table columns

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Serialize;

use super::{require_column, ArgKind, ArgReader, ArgSpec, Args, Category, Operation};
use crate::error::{BakeError, Result};
use crate::store::{parse_number_prefix, Environment, Row, Scalar, Table, Value};

/// Column name that stands for the 1-based row index
pub const ROW_INDEX: &str = "#";

/// `linear-regression`: y = m·x + b over two columns
pub struct LinearRegression;

/// Fitted line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl Fit {
    pub fn equation(&self) -> String {
        format!("y = {:.4}x + {:.4}", self.slope, self.intercept)
    }

    /// `[Metric, Value]` summary table
    pub fn to_table(&self) -> Table {
        let metric = |name: &str, value: Scalar| {
            let mut row = Row::new();
            row.insert("Metric".to_string(), Scalar::from(name));
            row.insert("Value".to_string(), value);
            row
        };

        Table::new(
            vec!["Metric".to_string(), "Value".to_string()],
            vec![
                metric("Slope (m)", Scalar::Number(self.slope)),
                metric("Intercept (b)", Scalar::Number(self.intercept)),
                metric("R-Squared", Scalar::Number(self.r_squared)),
                metric("Equation", Scalar::Text(self.equation())),
            ],
        )
    }
}

/// Least-squares fit. Fails on fewer than two points or when every x is equal.
pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Fit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Err(BakeError::InsufficientData {
            details: "Not enough numeric data points for regression (need at least 2)".to_string(),
        });
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let nf = n as f64;

    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

    let denominator = nf * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return Err(BakeError::InsufficientData {
            details: "Regression is undefined: all x values are equal".to_string(),
        });
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    Ok(Fit {
        slope,
        intercept,
        r_squared,
    })
}

fn read_point(row: &Row, index: usize, column: &str) -> Option<f64> {
    if column == ROW_INDEX {
        return Some((index + 1) as f64);
    }
    match row.get(column)? {
        Scalar::Number(n) if n.is_nan() => None,
        Scalar::Number(n) => Some(*n),
        Scalar::Text(s) => parse_number_prefix(s),
    }
}

/// Numeric (x, y) pairs; rows where either side is not numeric are skipped
pub fn collect_pairs(table: &Table, x_col: &str, y_col: &str) -> (Vec<f64>, Vec<f64>) {
    table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| Some((read_point(row, i, x_col)?, read_point(row, i, y_col)?)))
        .unzip()
}

static REGRESSION_ARGS: Lazy<Vec<ArgSpec>> = Lazy::new(|| {
    vec![
        ArgSpec::table_ref("tableVar", "Input Table").describe("Table containing the data"),
        ArgSpec::new("xCol", "X Column Name", ArgKind::String)
            .describe("Name of the independent variable column"),
        ArgSpec::new("yCol", "Y Column Name", ArgKind::String)
            .describe("Name of the dependent variable column"),
    ]
});

#[async_trait]
impl Operation for LinearRegression {
    fn id(&self) -> &'static str {
        "linear-regression"
    }

    fn name(&self) -> &'static str {
        "Linear Regression"
    }

    fn category(&self) -> Category {
        Category::Analysis
    }

    fn description(&self) -> &'static str {
        "Perform simple linear regression (y = mx + b) on two columns. Outputs a table with Slope, Intercept, and R²."
    }

    fn args(&self) -> &[ArgSpec] {
        &REGRESSION_ARGS
    }

    async fn run(&self, args: &Args, env: &Environment) -> Result<Value> {
        let reader = ArgReader::new(args);
        let table = reader.table("tableVar", env)?;
        let x_col = reader.required("xCol")?;
        let y_col = reader.required("yCol")?;

        for column in [&x_col, &y_col] {
            if column != ROW_INDEX {
                require_column(table, column)?;
            }
        }

        let (xs, ys) = collect_pairs(table, &x_col, &y_col);
        let fit = fit(&xs, &ys)?;
        Ok(Value::Table(fit.to_table()))
    }
}
