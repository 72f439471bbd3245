mod folder;
mod helpers;
mod ingredient;
mod plan;
mod recipe;
mod seed;
mod shopping;

pub(crate) use folder::{cmd_folder_create, cmd_folder_delete, cmd_folder_list};
pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_dedupe, cmd_ingredient_list, cmd_ingredient_verify,
};
pub(crate) use plan::{
    cmd_plan_add_meal, cmd_plan_archive, cmd_plan_create, cmd_plan_delete, cmd_plan_list,
    cmd_plan_remove_meal, cmd_plan_show,
};
pub(crate) use recipe::{
    cmd_recipe_add_ingredient, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import,
    cmd_recipe_label, cmd_recipe_list, cmd_recipe_move, cmd_recipe_remove_ingredient,
    cmd_recipe_show, cmd_recipe_unlabel,
};
pub(crate) use seed::{cmd_seed, ensure_catalog};
pub(crate) use shopping::{
    cmd_shopping_check, cmd_shopping_plan, cmd_shopping_range, cmd_shopping_reset,
    cmd_shopping_save,
};
