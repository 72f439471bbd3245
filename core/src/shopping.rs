use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;

use crate::models::{ConsolidatedIngredient, PlannedMealDetail, ShoppingListItem, Unit};

/// Consolidate ingredient demand across planned meals.
///
/// Every ingredient quantity is multiplied by its meal's portions and summed
/// per `(name, unit)`. Names are matched exactly and units are never
/// converted, so `Tomato`/`tomato` or the same name in grams and pieces stay
/// separate lines. Meals whose recipe did not resolve contribute nothing.
/// Entries come out in the order their group was first seen, unchecked.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn build_shopping_list(meals: &[PlannedMealDetail]) -> Vec<ConsolidatedIngredient> {
    let mut entries: Vec<ConsolidatedIngredient> = Vec::new();
    let mut index: HashMap<(String, Unit), usize> = HashMap::new();

    for meal in meals {
        let Some(recipe) = &meal.recipe else {
            continue;
        };
        let portions = meal.portions as f64;

        for ingredient in &recipe.ingredients {
            let pos = *index
                .entry((ingredient.name.clone(), ingredient.unit))
                .or_insert_with(|| {
                    entries.push(ConsolidatedIngredient {
                        name: ingredient.name.clone(),
                        unit: ingredient.unit,
                        quantity: 0.0,
                        checked: false,
                        recipe_ids: Vec::new(),
                        recipe_names: Vec::new(),
                    });
                    entries.len() - 1
                });

            let entry = &mut entries[pos];
            entry.quantity += ingredient.quantity * portions;
            if !entry.recipe_ids.contains(&recipe.id) {
                entry.recipe_ids.push(recipe.id);
                entry.recipe_names.push(recipe.name.clone());
            }
        }
    }

    entries
}

/// Copy the checked flag from saved items onto matching `(name, unit)` entries.
pub fn merge_saved_state(entries: &mut [ConsolidatedIngredient], saved: &[ShoppingListItem]) {
    let checked: HashMap<(&str, Unit), bool> = saved
        .iter()
        .map(|item| ((item.name.as_str(), item.unit), item.checked))
        .collect();

    for entry in entries.iter_mut() {
        if let Some(&state) = checked.get(&(entry.name.as_str(), entry.unit)) {
            entry.checked = state;
        }
    }
}

/// Format a quantity with at most two decimals and no trailing zeros.
#[must_use]
pub fn format_quantity(quantity: f64) -> String {
    let s = format!("{quantity:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

pub fn write_shopping_csv<W: Write>(entries: &[ConsolidatedIngredient], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["name", "quantity", "unit", "checked", "recipes"])?;
    for entry in entries {
        wtr.write_record([
            entry.name.as_str(),
            &format_quantity(entry.quantity),
            entry.unit.abbreviation(),
            if entry.checked { "yes" } else { "no" },
            &entry.recipe_names.join("; "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, Nutrition, RecipeDetail};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn ingredient(name: &str, quantity: f64, unit: Unit) -> Ingredient {
        Ingredient {
            id: 0,
            name: name.to_string(),
            quantity,
            unit,
            recipe_id: Some(1),
            nutrition: Nutrition::default(),
            unit_weight: None,
            position: 0,
        }
    }

    fn recipe(id: i64, name: &str, ingredients: Vec<Ingredient>) -> RecipeDetail {
        RecipeDetail {
            id,
            name: name.to_string(),
            description: String::new(),
            nutrition: Nutrition::default(),
            folder_id: None,
            ingredients,
            labels: Vec::new(),
        }
    }

    fn meal(portions: i64, recipe: Option<RecipeDetail>) -> PlannedMealDetail {
        PlannedMealDetail {
            id: 0,
            plan_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            portions,
            recipe,
        }
    }

    fn salad() -> RecipeDetail {
        recipe(
            1,
            "Salad",
            vec![
                ingredient("Lettuce", 100.0, Unit::Gram),
                ingredient("Tomato", 50.0, Unit::Gram),
            ],
        )
    }

    fn saved(name: &str, unit: Unit, checked: bool) -> ShoppingListItem {
        ShoppingListItem {
            id: 1,
            plan_id: 1,
            name: name.to_string(),
            unit,
            quantity: 0.0,
            checked,
            recipe_ids: Vec::new(),
            recipe_names: Vec::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_salad_two_portions() {
        let list = build_shopping_list(&[meal(2, Some(salad()))]);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Lettuce");
        assert_eq!(list[0].unit, Unit::Gram);
        assert_eq!(list[0].quantity, 200.0);
        assert_eq!(list[1].name, "Tomato");
        assert_eq!(list[1].quantity, 100.0);
        assert!(list.iter().all(|e| !e.checked));
    }

    #[test]
    fn test_sums_across_meals_and_recipes() {
        let soup = recipe(
            2,
            "Soup",
            vec![
                ingredient("Tomato", 300.0, Unit::Gram),
                ingredient("Onion", 1.0, Unit::Piece),
            ],
        );
        let list = build_shopping_list(&[
            meal(1, Some(salad())),
            meal(3, Some(soup)),
            meal(1, Some(salad())),
        ]);
        let tomato = list.iter().find(|e| e.name == "Tomato").unwrap();
        // 50 + 300 * 3 + 50
        assert_eq!(tomato.quantity, 1000.0);
        assert_eq!(tomato.recipe_ids, vec![1, 2]);
        assert_eq!(tomato.recipe_names, vec!["Salad", "Soup"]);

        let onion = list.iter().find(|e| e.name == "Onion").unwrap();
        assert_eq!(onion.quantity, 3.0);
        assert_eq!(onion.recipe_ids, vec![2]);
    }

    #[test]
    fn test_units_are_not_merged() {
        let r = recipe(
            1,
            "Mixed",
            vec![
                ingredient("Milk", 200.0, Unit::Milliliter),
                ingredient("Milk", 50.0, Unit::Gram),
            ],
        );
        let list = build_shopping_list(&[meal(1, Some(r))]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let r = recipe(
            1,
            "Mixed",
            vec![
                ingredient("Tomato", 1.0, Unit::Piece),
                ingredient("tomato", 1.0, Unit::Piece),
                ingredient("Tomato ", 1.0, Unit::Piece),
            ],
        );
        let list = build_shopping_list(&[meal(1, Some(r))]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_same_ingredient_twice_in_recipe_sums() {
        let r = recipe(
            1,
            "Double",
            vec![
                ingredient("Salt", 2.0, Unit::Gram),
                ingredient("Salt", 3.0, Unit::Gram),
            ],
        );
        let list = build_shopping_list(&[meal(2, Some(r))]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].quantity, 10.0);
        assert_eq!(list[0].recipe_ids, vec![1]);
    }

    #[test]
    fn test_unresolved_recipe_contributes_nothing() {
        let list = build_shopping_list(&[meal(4, None), meal(1, Some(salad()))]);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].quantity, 100.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_shopping_list(&[]).is_empty());
        assert!(build_shopping_list(&[meal(1, None)]).is_empty());
        assert!(build_shopping_list(&[meal(1, Some(recipe(3, "Empty", vec![])))]).is_empty());
    }

    #[test]
    fn test_merge_saved_state() {
        let mut list = build_shopping_list(&[meal(2, Some(salad()))]);
        merge_saved_state(
            &mut list,
            &[
                saved("Lettuce", Unit::Gram, true),
                saved("Tomato", Unit::Piece, true),
                saved("Bread", Unit::Gram, true),
            ],
        );
        assert!(list[0].checked);
        // Same name, different unit: no match
        assert!(!list[1].checked);
    }

    #[test]
    fn test_merge_saved_state_unchecked_overrides() {
        let mut list = build_shopping_list(&[meal(1, Some(salad()))]);
        list[0].checked = true;
        merge_saved_state(&mut list, &[saved("Lettuce", Unit::Gram, false)]);
        assert!(!list[0].checked);
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(200.0), "200");
        assert_eq!(format_quantity(1.5), "1.5");
        assert_eq!(format_quantity(0.333_333), "0.33");
        assert_eq!(format_quantity(0.0), "0");
        assert_eq!(format_quantity(-0.001), "0");
    }

    #[test]
    fn test_write_shopping_csv() {
        let mut list = build_shopping_list(&[meal(2, Some(salad()))]);
        list[1].checked = true;
        let mut out = Vec::new();
        write_shopping_csv(&list, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,quantity,unit,checked,recipes");
        assert_eq!(lines[1], "Lettuce,200,g,no,Salad");
        assert_eq!(lines[2], "Tomato,100,g,yes,Salad");
    }

    #[test]
    fn test_write_shopping_csv_quotes_fields() {
        let r = recipe(1, "Bread, rye", vec![ingredient("Flour", 500.0, Unit::Gram)]);
        let list = build_shopping_list(&[meal(1, Some(r))]);
        let mut out = Vec::new();
        write_shopping_csv(&list, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Flour,500,g,no,\"Bread, rye\""));
    }

    fn normalized(list: &[ConsolidatedIngredient]) -> Vec<(String, Unit, f64, Vec<i64>)> {
        let mut rows: Vec<_> = list
            .iter()
            .map(|e| {
                let mut ids = e.recipe_ids.clone();
                ids.sort_unstable();
                (e.name.clone(), e.unit, e.quantity, ids)
            })
            .collect();
        rows.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        rows
    }

    fn meal_strategy() -> impl Strategy<Value = PlannedMealDetail> {
        let unit = prop_oneof![Just(Unit::Gram), Just(Unit::Milliliter), Just(Unit::Piece)];
        let line = (prop::sample::select(vec!["Egg", "Flour", "Milk", "egg"]), 0u32..500, unit);
        (
            1i64..4,
            1i64..5,
            prop::collection::vec(line, 0..5),
            prop::bool::weighted(0.9),
        )
            .prop_map(|(recipe_id, portions, lines, resolved)| {
                let ingredients = lines
                    .into_iter()
                    .map(|(name, qty, unit)| ingredient(name, f64::from(qty), unit))
                    .collect();
                let r = recipe(recipe_id, &format!("Recipe {recipe_id}"), ingredients);
                meal(portions, resolved.then_some(r))
            })
    }

    proptest! {
        #[test]
        fn test_shuffled_meals_give_same_list(
            (meals, shuffled) in prop::collection::vec(meal_strategy(), 0..8)
                .prop_flat_map(|meals| (Just(meals.clone()), Just(meals).prop_shuffle()))
        ) {
            let a = normalized(&build_shopping_list(&meals));
            let b = normalized(&build_shopping_list(&shuffled));
            prop_assert_eq!(a, b);
        }

        #[test]
        #[allow(clippy::cast_precision_loss)]
        fn test_quantity_is_sum_of_scaled_lines(meals in prop::collection::vec(meal_strategy(), 0..8)) {
            for entry in build_shopping_list(&meals) {
                let expected: f64 = meals
                    .iter()
                    .filter_map(|m| m.recipe.as_ref().map(|r| (m.portions, r)))
                    .flat_map(|(portions, r)| {
                        r.ingredients
                            .iter()
                            .filter(|i| i.name == entry.name && i.unit == entry.unit)
                            .map(move |i| i.quantity * portions as f64)
                    })
                    .sum();
                prop_assert!((entry.quantity - expected).abs() < 1e-9);
            }
        }
    }
}
