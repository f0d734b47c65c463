use serde::{Deserialize, Serialize};

use super::Product;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price captured when the item was added, in minor units.
    pub unit_price: i64,
}

impl CartItem {
    pub fn total_price(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// Products a user intends to buy, keyed by product id and kept in the order
/// they were first added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Put `quantity` of `product` in the cart, replacing any previous entry
    /// for the same product. A zero quantity removes the entry.
    pub fn add(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            self.remove(&product.id);
            return;
        }

        let item = CartItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            quantity,
            unit_price: product.price,
        };

        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total(&self) -> i64 {
        self.items.iter().map(CartItem::total_price).sum()
    }

    pub fn get(&self, product_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CartItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a CartItem;
    type IntoIter = std::slice::Iter<'a, CartItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.to_string(),
            category_id: "cat".to_string(),
            name: format!("Place {id}"),
            description: String::new(),
            price,
            image_url: None,
            is_active: true,
            is_free: true,
            is_took_place: false,
            lessor_id: None,
            expiration_date: None,
        }
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let mut cart = Cart::default();
        cart.add(&product("a", 500), 2);
        cart.add(&product("b", 1_200), 3);
        assert_eq!(cart.total(), 2 * 500 + 3 * 1_200);
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn test_add_same_product_replaces_entry() {
        let mut cart = Cart::default();
        cart.add(&product("a", 500), 2);
        cart.add(&product("a", 500), 5);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get("a").unwrap().quantity, 5);
        assert_eq!(cart.total(), 2_500);
    }

    #[test]
    fn test_price_snapshot_survives_price_change() {
        let mut cart = Cart::default();
        let mut p = product("a", 500);
        cart.add(&p, 1);
        p.price = 9_999;
        assert_eq!(cart.total(), 500);

        // Re-adding takes a fresh snapshot.
        cart.add(&p, 1);
        assert_eq!(cart.total(), 9_999);
    }

    #[test]
    fn test_zero_quantity_removes_entry() {
        let mut cart = Cart::default();
        cart.add(&product("a", 500), 2);
        cart.add(&product("a", 500), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_missing_is_noop_and_remove_twice_matches_once() {
        let mut cart = Cart::default();
        cart.add(&product("a", 500), 1);
        cart.add(&product("b", 700), 1);

        assert!(!cart.remove("zzz"));
        assert_eq!(cart.len(), 2);

        let mut once = cart.clone();
        once.remove("a");
        let mut twice = cart.clone();
        twice.remove("a");
        assert!(!twice.remove("a"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut cart = Cart::default();
        cart.add(&product("b", 1), 1);
        cart.add(&product("a", 1), 1);
        cart.add(&product("b", 1), 4);
        let ids: Vec<_> = cart.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_serializes_as_list() {
        let mut cart = Cart::default();
        cart.add(&product("a", 500), 2);
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.is_array());
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
