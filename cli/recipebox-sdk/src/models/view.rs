//! Projections of the browsed recipes.

use recipebox_catalog::Recipe;

use super::likes::LikeStore;

/// The recipes to show for the current tag and like filter.
///
/// With a tag selected, a recipe is kept if one of its tags or its cuisine
/// equals the tag, ignoring case. With `show_liked_only`, only liked recipes
/// are kept. Order is preserved.
pub fn derive_view<'a>(
    items: &'a [Recipe],
    selected_tag: &str,
    likes: &LikeStore,
    show_liked_only: bool,
) -> Vec<&'a Recipe> {
    items
        .iter()
        .filter(|recipe| {
            selected_tag.is_empty()
                || recipe.has_tag(selected_tag)
                || recipe.has_cuisine(selected_tag)
        })
        .filter(|recipe| !show_liked_only || likes.is_liked(recipe.id))
        .collect()
}

/// The liked recipes among `items`.
pub fn liked_items<'a>(items: &'a [Recipe], likes: &LikeStore) -> Vec<&'a Recipe> {
    items
        .iter()
        .filter(|recipe| likes.is_liked(recipe.id))
        .collect()
}
