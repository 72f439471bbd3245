use anyhow::Result;
use serde::Serialize;

use larder_core::models::ConsolidatedIngredient;
use larder_core::service::LarderService;
use larder_core::shopping::write_shopping_csv;

use super::helpers::{exit_not_found, parse_date, parse_unit, print_shopping_table};

#[derive(Serialize)]
struct ShoppingView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<i64>,
    from: String,
    to: String,
    items: &'a [ConsolidatedIngredient],
}

fn print_list(view: &ShoppingView<'_>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }
    match view.plan_id {
        Some(id) => println!("=== Shopping list: plan {id} ({} to {}) ===", view.from, view.to),
        None => println!("=== Shopping list: {} to {} ===", view.from, view.to),
    }
    if view.items.is_empty() {
        println!("  Nothing to buy");
        return Ok(());
    }
    print_shopping_table(view.items);
    let done = view.items.iter().filter(|e| e.checked).count();
    println!("  {done}/{} checked", view.items.len());
    Ok(())
}

fn ensure_plan(svc: &LarderService, plan_id: i64, json: bool) -> Result<()> {
    if svc.db().find_plan(plan_id)?.is_none() {
        exit_not_found(&format!("Plan {plan_id} not found"), json);
    }
    Ok(())
}

pub(crate) fn cmd_shopping_range(svc: &LarderService, from: &str, to: &str, json: bool) -> Result<()> {
    let from = parse_date(Some(from.to_string()))?;
    let to = parse_date(Some(to.to_string()))?;
    let items = svc.shopping_list(from, to)?;
    print_list(
        &ShoppingView {
            plan_id: None,
            from: from.to_string(),
            to: to.to_string(),
            items: &items,
        },
        json,
    )
}

pub(crate) fn cmd_shopping_plan(svc: &LarderService, plan_id: i64, csv: bool, json: bool) -> Result<()> {
    ensure_plan(svc, plan_id, json)?;
    let plan = svc.db().get_plan(plan_id)?;
    let items = svc.plan_shopping_list(plan_id)?;

    if csv {
        return write_shopping_csv(&items, std::io::stdout().lock());
    }
    print_list(
        &ShoppingView {
            plan_id: Some(plan_id),
            from: plan.start_date.to_string(),
            to: plan.end_date.to_string(),
            items: &items,
        },
        json,
    )
}

pub(crate) fn cmd_shopping_check(
    svc: &LarderService,
    plan_id: i64,
    name: &str,
    unit: &str,
    undo: bool,
    json: bool,
) -> Result<()> {
    ensure_plan(svc, plan_id, json)?;
    let unit = parse_unit(unit)?;
    let item = svc.set_shopping_item_checked(plan_id, name, unit, !undo)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let mark = if item.checked { "[x]" } else { "[ ]" };
        println!("{mark} {} ({})", item.name, item.unit.abbreviation());
    }
    Ok(())
}

pub(crate) fn cmd_shopping_save(svc: &LarderService, plan_id: i64, json: bool) -> Result<()> {
    ensure_plan(svc, plan_id, json)?;
    let saved = svc.save_plan_shopping_list(plan_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Saved {} shopping list items for plan {plan_id}", saved.len());
    }
    Ok(())
}

pub(crate) fn cmd_shopping_reset(svc: &LarderService, plan_id: i64, json: bool) -> Result<()> {
    ensure_plan(svc, plan_id, json)?;
    let cleared = svc.clear_plan_shopping_state(plan_id)?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else {
        println!("Cleared {cleared} saved items for plan {plan_id}");
    }
    Ok(())
}
