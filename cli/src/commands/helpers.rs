use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{ConsolidatedIngredient, Ingredient, Unit, convert_to_unit};
use larder_core::shopping::format_quantity;

/// Parse a quantity such as "200g", "1.5 kg", "2 tbsp" or "3 pcs" into one of
/// the stored units. A bare number is taken in `default_unit`.
pub(crate) fn parse_quantity(s: &str, default_unit: Unit) -> Result<(f64, Unit)> {
    let s = s.trim();

    let (quantity, unit) = if let Ok(n) = s.parse::<f64>() {
        (n, default_unit)
    } else {
        let (qty, unit_str) = if let Some(split) = split_number_unit(s) {
            split
        } else {
            let (num, unit) = s.split_once(char::is_whitespace).with_context(|| {
                format!("Invalid quantity '{s}'. Use '200g', '500ml', '2 tbsp', '3 pcs' or a number")
            })?;
            let qty: f64 = num
                .parse()
                .with_context(|| format!("Invalid quantity: '{s}'"))?;
            (qty, unit.trim())
        };
        convert_to_unit(qty, unit_str).with_context(|| {
            format!("Unknown unit '{unit_str}' in '{s}'. Supported: g, kg, lb, oz, ml, l, tbsp, tsp, pcs")
        })?
    };

    if quantity <= 0.0 || !quantity.is_finite() {
        bail!("Quantity must be greater than 0");
    }
    Ok((quantity, unit))
}

/// Split "500ml" or "2.5tbsp" into (500.0, "ml") or (2.5, "tbsp").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.trim().parse().ok()?;
    Some((qty, unit_part))
}

/// Parse a unit name given on the command line.
pub(crate) fn parse_unit(s: &str) -> Result<Unit> {
    match s.trim().to_lowercase().as_str() {
        "g" | "gram" | "grams" => Ok(Unit::Gram),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => Ok(Unit::Milliliter),
        "pc" | "pcs" | "piece" | "pieces" => Ok(Unit::Piece),
        _ => bail!("Unknown unit '{s}'. Use g, ml or pcs"),
    }
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "C")]
        carbs: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            amount: format!("{} {}", format_quantity(i.quantity), i.unit.abbreviation()),
            calories: format!("{:.0}", no_neg_zero(i.nutrition.calories)),
            protein: format!("{:.1}", no_neg_zero(i.nutrition.protein)),
            fat: format!("{:.1}", no_neg_zero(i.nutrition.fat)),
            carbs: format!("{:.1}", no_neg_zero(i.nutrition.carbs)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_shopping_table(entries: &[ConsolidatedIngredient]) {
    #[derive(Tabled)]
    struct ShoppingRow {
        #[tabled(rename = "")]
        checked: &'static str,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: &'static str,
        #[tabled(rename = "Recipes")]
        recipes: String,
    }

    let rows: Vec<ShoppingRow> = entries
        .iter()
        .map(|e| ShoppingRow {
            checked: if e.checked { "[x]" } else { "[ ]" },
            name: truncate(&e.name, 35),
            quantity: format_quantity(e.quantity),
            unit: e.unit.abbreviation(),
            recipes: truncate(&e.recipe_names.join(", "), 40),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    std::process::exit(2);
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_bare_number_uses_default_unit() {
        assert_eq!(parse_quantity("3", Unit::Piece).unwrap(), (3.0, Unit::Piece));
        assert_eq!(parse_quantity("250", Unit::Gram).unwrap(), (250.0, Unit::Gram));
    }

    #[test]
    fn test_parse_quantity_attached_unit() {
        assert_eq!(parse_quantity("200g", Unit::Piece).unwrap(), (200.0, Unit::Gram));
        assert_eq!(
            parse_quantity("500ml", Unit::Gram).unwrap(),
            (500.0, Unit::Milliliter)
        );
        assert_eq!(parse_quantity("1.5kg", Unit::Gram).unwrap(), (1500.0, Unit::Gram));
    }

    #[test]
    fn test_parse_quantity_spaced_unit() {
        assert_eq!(
            parse_quantity("2 tbsp", Unit::Gram).unwrap(),
            (30.0, Unit::Milliliter)
        );
        assert_eq!(parse_quantity("3 pcs", Unit::Gram).unwrap(), (3.0, Unit::Piece));
        assert_eq!(parse_quantity(" 1 l ", Unit::Gram).unwrap(), (1000.0, Unit::Milliliter));
    }

    #[test]
    fn test_parse_quantity_invalid() {
        assert!(parse_quantity("abc", Unit::Gram).is_err());
        assert!(parse_quantity("2 cups", Unit::Gram).is_err());
        assert!(parse_quantity("0", Unit::Gram).is_err());
        assert!(parse_quantity("-5g", Unit::Gram).is_err());
        assert!(parse_quantity("", Unit::Gram).is_err());
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!(parse_unit("g").unwrap(), Unit::Gram);
        assert_eq!(parse_unit("Gram").unwrap(), Unit::Gram);
        assert_eq!(parse_unit("ML").unwrap(), Unit::Milliliter);
        assert_eq!(parse_unit("pcs").unwrap(), Unit::Piece);
        assert!(parse_unit("cup").is_err());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso_and_invalid() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("Plan 3 not found"), r#"{"error":"Plan 3 not found"}"#);
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("고추장 양념 닭갈비 볶음", 8), "고추장 양...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
