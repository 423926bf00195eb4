//! Text and icon helpers shared by the desktop and terminal front ends.

use shared::domain::{AgentState, CartItem, Product};

pub const APP_TITLE: &str = "Salesvoice";
pub const APP_SUBTITLE: &str = "AI Voice Agent";
pub const LOADING_TEXT: &str = "Connecting to Salesvoice...";
pub const START_BUTTON_TEXT: &str = "Start Experience";
pub const CART_HEADING: &str = "Your Cart";
pub const CATALOG_HEADING: &str = "Catalog";
pub const EMPTY_CART_TEXT: &str = "Your cart is empty";
pub const EMPTY_TRANSCRIPT_TEXT: &str = "Start speaking to place an order...";
pub const SUCCESS_TITLE: &str = "Order Confirmed!";
pub const SUCCESS_BODY: &str = "Your order has been placed successfully.";

const NAME_ICONS: &[(&[&str], &str)] = &[
    (&["coca", "pepsi", "dew"], "🥤"),
    (&["lays"], "🍟"),
    (&["kurkure"], "🍿"),
    (&["dairy", "silk"], "🍫"),
    (&["kitkat"], "🍫"),
];

const FALLBACK_ICON: &str = "🛒";

/// Picks a catalog icon from the product name first, then its category.
pub fn product_icon(name: &str, category: &str) -> &'static str {
    let name = name.to_lowercase();
    for (needles, icon) in NAME_ICONS {
        if needles.iter().any(|needle| name.contains(*needle)) {
            return *icon;
        }
    }
    match category {
        "Drinks" => "🥤",
        "Snacks" => "🍿",
        "Chocolates" => "🍫",
        _ => FALLBACK_ICON,
    }
}

pub fn icon_for(product: &Product) -> &'static str {
    product_icon(&product.name, &product.category)
}

pub fn format_inr(amount: f64) -> String {
    if amount.fract() == 0.0 {
        return format!("₹{amount:.0}");
    }
    let fixed = format!("{amount:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("₹{trimmed}")
}

/// `₹40 × 2`
pub fn line_breakdown(item: &CartItem) -> String {
    format!("{} × {}", format_inr(item.product.price), item.quantity)
}

pub fn stock_label(product: &Product) -> String {
    format!("Stock: {}", product.stock)
}

pub fn agent_state_text(state: AgentState) -> &'static str {
    state.label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ProductId;

    #[test]
    fn name_rules_win_over_category() {
        assert_eq!(product_icon("Coca Cola", "Snacks"), "🥤");
        assert_eq!(product_icon("Mountain Dew", "Drinks"), "🥤");
        assert_eq!(product_icon("Lays Magic Masala", "Snacks"), "🍟");
        assert_eq!(product_icon("Kurkure", "Snacks"), "🍿");
        assert_eq!(product_icon("Dairy Milk Silk", "Chocolates"), "🍫");
        assert_eq!(product_icon("KitKat", "Snacks"), "🍫");
    }

    #[test]
    fn category_and_fallback_icons() {
        assert_eq!(product_icon("Sprite", "Drinks"), "🥤");
        assert_eq!(product_icon("Bingo", "Snacks"), "🍿");
        assert_eq!(product_icon("Perk", "Chocolates"), "🍫");
        assert_eq!(product_icon("Soap", "Household"), "🛒");
        assert_eq!(product_icon("Sprite", "drinks"), "🛒");
    }

    #[test]
    fn rupee_amounts_drop_needless_decimals() {
        assert_eq!(format_inr(40.0), "₹40");
        assert_eq!(format_inr(0.0), "₹0");
        assert_eq!(format_inr(12.5), "₹12.5");
        assert_eq!(format_inr(19.99), "₹19.99");
        assert_eq!(format_inr(0.1 + 0.2), "₹0.3");
    }

    #[test]
    fn cart_line_shows_unit_price_and_quantity() {
        let item = CartItem::new(
            Product {
                id: ProductId::from("p1"),
                name: "Cola".into(),
                category: "Drinks".into(),
                price: 40.0,
                stock: 12,
            },
            3,
        );
        assert_eq!(line_breakdown(&item), "₹40 × 3");
        assert_eq!(format_inr(item.line_total()), "₹120");
        assert_eq!(stock_label(&item.product), "Stock: 12");
        assert_eq!(icon_for(&item.product), "🥤");
    }
}
