use anyhow::Result;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::db::Database;
use larder_core::models::{NewPlannedMeal, Plan, PlannedMealDetail};
use larder_core::service::LarderService;

use super::helpers::{exit_not_found, parse_date, truncate};
use super::recipe::resolve_recipe;

pub(crate) fn cmd_plan_create(db: &Database, start: &str, end: &str, json: bool) -> Result<()> {
    let start = parse_date(Some(start.to_string()))?;
    let end = parse_date(Some(end.to_string()))?;
    let plan = db.create_plan(start, end)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!(
            "Created plan {} ({} to {})",
            plan.id, plan.start_date, plan.end_date
        );
    }
    Ok(())
}

pub(crate) fn cmd_plan_list(db: &Database, all: bool, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "From")]
        start: String,
        #[tabled(rename = "To")]
        end: String,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let plans = db.list_plans(all)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    if plans.is_empty() {
        println!("No plans. Create one with: larder plan create <start> <end>");
        return Ok(());
    }

    let rows = plans
        .iter()
        .map(|p| {
            Ok(PlanRow {
                id: p.id,
                start: p.start_date.to_string(),
                end: p.end_date.to_string(),
                meals: db.planned_meals_for_plan(p.id)?.len(),
                status: if p.archived { "archived" } else { "active" },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

#[derive(Serialize)]
struct PlanView<'a> {
    #[serde(flatten)]
    plan: &'a Plan,
    meals: &'a [PlannedMealDetail],
}

pub(crate) fn cmd_plan_show(svc: &LarderService, id: i64, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Portions")]
        portions: i64,
        #[tabled(rename = "Cal")]
        calories: String,
    }

    if svc.db().find_plan(id)?.is_none() {
        exit_not_found(&format!("Plan {id} not found"), json);
    }
    let (plan, meals) = svc.plan_meals(id)?;

    if json {
        let view = PlanView {
            plan: &plan,
            meals: &meals,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let archived = if plan.archived { " [archived]" } else { "" };
    println!(
        "=== Plan {} === {} to {}{archived}",
        plan.id, plan.start_date, plan.end_date
    );
    if meals.is_empty() {
        println!("  No meals planned");
        return Ok(());
    }

    #[allow(clippy::cast_precision_loss)]
    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            date: m.date.format("%a %Y-%m-%d").to_string(),
            recipe: m
                .recipe
                .as_ref()
                .map_or_else(|| "(deleted recipe)".to_string(), |r| truncate(&r.name, 30)),
            portions: m.portions,
            calories: m.recipe.as_ref().map_or_else(String::new, |r| {
                format!("{:.0}", r.nutrition.calories * m.portions as f64)
            }),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_plan_add_meal(
    db: &Database,
    plan_id: i64,
    recipe_query: &str,
    date: &str,
    portions: i64,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    let date = parse_date(Some(date.to_string()))?;
    let meal = db.add_planned_meal(&NewPlannedMeal {
        plan_id,
        recipe_id: recipe.id,
        date,
        portions,
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Planned {} x{portions} on {date} (meal id: {})",
            recipe.name, meal.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove_meal(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.remove_planned_meal(id)? {
        exit_not_found(&format!("Planned meal {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Removed planned meal {id}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_archive(db: &Database, id: i64, undo: bool, json: bool) -> Result<()> {
    if db.find_plan(id)?.is_none() {
        exit_not_found(&format!("Plan {id} not found"), json);
    }
    let plan = db.set_plan_archived(id, !undo)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else if plan.archived {
        println!("Archived plan {id}");
    } else {
        println!("Restored plan {id}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.delete_plan(id)? {
        exit_not_found(&format!("Plan {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted plan {id}");
    }
    Ok(())
}
