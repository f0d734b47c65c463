//! Main menu, catalog browsing and cart handlers.

use super::effect::{escape_html, respond};
use super::{callback_arg, hours_label, Effect, Event, Outcome, Turn};
use crate::db::queries;
use crate::errors::BotError;
use crate::models::{format_money, Cart, ConversationContext, ConversationState, Product};
use crate::services::keyboard::{build_menu, Button, Keyboard};

pub(super) const DEPARTURE_FORMAT: &str = "%d %B %Y, %H:%M";

/// Longest stay that can be booked in one go.
pub const MAX_HOURS: u32 = 24;

pub fn main_menu_keyboard() -> Keyboard {
    Keyboard::Inline(vec![
        vec![Button::new("📋 Free places", "catalog")],
        vec![Button::new("🛒 My cart", "cart")],
        vec![Button::new("🅿️ My reservations", "purchases")],
        vec![Button::new("🗣 FAQ", "faq")],
        vec![Button::new("🛠 Support", "support")],
    ])
}

fn back_keyboard() -> Keyboard {
    Keyboard::Inline(vec![vec![Button::back()]])
}

pub fn show_main_menu(
    _turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    Ok(Outcome::to(
        ConversationState::MainMenu,
        respond(event, "Choose an action:", main_menu_keyboard()),
    ))
}

// ── Categories ──

fn render_categories(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
    requested_page: u32,
) -> Result<Outcome, BotError> {
    let page = {
        let db = turn.db()?;
        queries::list_categories(&db, requested_page, turn.settings.page_size)?
    };
    ctx.user_data.current_page = Some(page.number);

    let buttons = page
        .items
        .iter()
        .map(|c| Button::new(c.name.clone(), c.id.clone()))
        .collect();

    let mut footer = vec![];
    if page.has_previous {
        footer.push(Button::new("<<<", "prev"));
    }
    if page.has_next {
        footer.push(Button::new(">>>", "next"));
    }
    footer.push(Button::main_menu());

    let keyboard = Keyboard::Inline(build_menu(buttons, 2, None, Some(footer)));
    Ok(Outcome::to(
        ConversationState::Categories,
        respond(event, "Choose a parking zone:", keyboard),
    ))
}

pub fn show_first_page(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    render_categories(turn, ctx, event, 1)
}

pub fn show_current_page(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let page = ctx.user_data.current_page.unwrap_or(1);
    render_categories(turn, ctx, event, page)
}

pub fn next_page(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let page = ctx.user_data.current_page.unwrap_or(1).saturating_add(1);
    render_categories(turn, ctx, event, page)
}

pub fn prev_page(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let page = ctx.user_data.current_page.unwrap_or(1).saturating_sub(1);
    render_categories(turn, ctx, event, page)
}

// ── Products ──

fn product_detail(product: &Product) -> String {
    let mut text = format!("<b>{}</b>\n", escape_html(&product.name));
    if !product.description.is_empty() {
        text.push_str(&format!("<i>{}</i>\n", escape_html(&product.description)));
    }
    text.push_str(&format!("Price per hour: <b>{}</b>", format_money(product.price)));
    text
}

pub fn show_products(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let category_id = callback_arg(event, "")?;
    let products = {
        let db = turn.db()?;
        if queries::get_category(&db, category_id)?.is_none() {
            return Err(BotError::NotFound(format!("category {category_id}")));
        }
        queries::list_free_products(&db, category_id)?
    };

    let mut effects: Vec<Effect> = Effect::ack(event, None).into_iter().collect();
    for product in &products {
        let select = Keyboard::Inline(vec![vec![Button::new("Select", product.id.clone())]]);
        let effect = match &product.image_url {
            Some(photo) => Effect::SendPhoto {
                photo: photo.clone(),
                caption: product_detail(product),
                keyboard: Some(select),
            },
            None => Effect::text_with(product_detail(product), select),
        };
        effects.push(effect);
    }
    effects.push(Effect::text_with(
        format!("Free places shown: {}", products.len()),
        Keyboard::Inline(vec![vec![Button::back(), Button::main_menu()]]),
    ));

    Ok(Outcome::to(ConversationState::Products, effects))
}

/// Fetch a product that can still be reserved.
fn reservable_product(turn: &Turn, product_id: &str) -> Result<Product, BotError> {
    let product = {
        let db = turn.db()?;
        queries::get_product(&db, product_id)?
    }
    .filter(|p| p.is_active)
    .ok_or_else(|| BotError::NotFound(format!("product {product_id}")))?;

    if !product.is_free {
        return Err(BotError::Conflict(format!(
            "Sorry, {} has just been reserved by someone else.",
            product.name
        )));
    }
    Ok(product)
}

pub fn show_product_detail(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let product = reservable_product(turn, callback_arg(event, "")?)?;
    ctx.user_data.product_id = Some(product.id.clone());
    ctx.user_data.quantity = None;

    let mut buttons: Vec<Button> = (1..=3)
        .map(|h| Button::new(hours_label(h), h.to_string()))
        .collect();
    buttons.push(Button::back());

    let text = format!(
        "Parking place: {}\n\nChoose how many hours or type your own number:",
        product_detail(&product)
    );

    let mut effects: Vec<Effect> = Effect::ack(event, None).into_iter().collect();
    effects.push(Effect::text_with(
        text,
        Keyboard::Inline(build_menu(buttons, 1, None, None)),
    ));
    Ok(Outcome::to(ConversationState::AwaitingQuantity, effects))
}

/// Accepts input starting with digits; the leading digits are the quantity,
/// between 1 and [`MAX_HOURS`].
pub fn parse_quantity(input: &str) -> Result<u32, BotError> {
    let digits: String = input
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();

    let not_a_number =
        || BotError::Validation("The number of hours must be a number.\nEnter the number of hours:".to_string());
    if digits.is_empty() {
        return Err(not_a_number());
    }

    let too_long = || {
        BotError::Validation(format!(
            "A place can be booked for at most {MAX_HOURS} hours.\nEnter the number of hours:"
        ))
    };
    // Leading zeros aside, more than two digits is always out of range.
    let quantity: u32 = match digits.trim_start_matches('0') {
        "" => 0,
        significant if significant.len() > 2 => return Err(too_long()),
        significant => significant.parse().map_err(|_| not_a_number())?,
    };
    if quantity == 0 {
        return Err(BotError::Validation(
            "The number of hours must be greater than 0.".to_string(),
        ));
    }
    if quantity > MAX_HOURS {
        return Err(too_long());
    }
    Ok(quantity)
}

pub fn check_quantity(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let input = match event {
        Event::TextMessage(text) => text.as_str(),
        _ => event.callback_data().unwrap_or_default(),
    };
    let quantity = parse_quantity(input)?;

    let product_id = ctx
        .user_data
        .product_id
        .clone()
        .ok_or_else(|| BotError::Validation("Choose a parking place first.".to_string()))?;
    let product = reservable_product(turn, &product_id)?;
    ctx.user_data.quantity = Some(quantity);

    let keyboard = Keyboard::Inline(vec![vec![
        Button::back(),
        Button::new("Confirm", "confirm"),
    ]]);

    let mut effects: Vec<Effect> = Effect::ack(event, None).into_iter().collect();
    effects.push(Effect::text_with(
        format!(
            "You chose <b>{}</b> for {}.",
            escape_html(&product.name),
            hours_label(quantity)
        ),
        keyboard,
    ));
    Ok(Outcome::to(ConversationState::AwaitingQuantity, effects))
}

// ── Cart ──

pub fn render_cart(cart: &Cart) -> (String, Keyboard) {
    let mut text = String::new();
    let mut buttons = vec![];

    for (position, item) in cart.iter().enumerate() {
        let position = position + 1;
        text.push_str(&format!(
            "№{position}. <b>{}</b>\n<i>Price:</i> {}\n<i>Hours:</i> {}\n<i>Cost:</i> {}\n\n",
            escape_html(&item.name),
            format_money(item.unit_price),
            item.quantity,
            format_money(item.total_price()),
        ));
        buttons.push(Button::new(
            format!("Remove №{position}"),
            format!("remove:{}", item.product_id),
        ));
    }
    text.push_str(&format!("<i>Total:</i> {}", format_money(cart.total())));

    let mut rows = build_menu(buttons, 2, None, None);
    rows.push(vec![Button::new("Pay", "payment")]);
    rows.push(vec![Button::back()]);
    (text, Keyboard::Inline(rows))
}

pub fn add_to_cart(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let (Some(product_id), Some(quantity)) =
        (ctx.user_data.product_id.clone(), ctx.user_data.quantity)
    else {
        return Err(BotError::Validation(
            "Choose a parking place and the number of hours first.".to_string(),
        ));
    };

    let product = reservable_product(turn, &product_id)?;
    ctx.cart.add(&product, quantity);

    let (text, keyboard) = render_cart(&ctx.cart);
    let mut effects: Vec<Effect> = Effect::ack(event, Some("Added to cart")).into_iter().collect();
    effects.push(Effect::replace(event, text, keyboard));
    Ok(Outcome::to(ConversationState::ShowingCart, effects))
}

pub fn show_cart(
    _turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    if ctx.cart.is_empty() {
        let effects = Effect::ack(event, Some("Your cart is empty"))
            .into_iter()
            .collect();
        return Ok(Outcome::to(ctx.state, effects));
    }

    let (text, keyboard) = render_cart(&ctx.cart);
    Ok(Outcome::to(
        ConversationState::ShowingCart,
        respond(event, text, keyboard),
    ))
}

pub fn remove_from_cart(
    _turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let product_id = callback_arg(event, "remove:")?;
    ctx.cart.remove(product_id);

    let replacement = if ctx.cart.is_empty() {
        Effect::replace(event, "Your cart is empty.", back_keyboard())
    } else {
        let (text, keyboard) = render_cart(&ctx.cart);
        Effect::replace(event, text, keyboard)
    };

    let mut effects: Vec<Effect> = Effect::ack(event, Some("Removed from cart"))
        .into_iter()
        .collect();
    effects.push(replacement);
    Ok(Outcome::to(ConversationState::ShowingCart, effects))
}

// ── Info pages ──

pub fn show_purchases(
    turn: &Turn,
    ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let products = {
        let db = turn.db()?;
        let user = queries::get_or_create_user(&db, turn.sender)?;
        queries::list_user_products(&db, &user.id)?
    };

    if products.is_empty() {
        let effects = Effect::ack(event, Some("You have no reservations"))
            .into_iter()
            .collect();
        return Ok(Outcome::to(ctx.state, effects));
    }

    let mut text = String::new();
    for (position, product) in products.iter().enumerate() {
        let departure = product
            .departure_time(turn.settings.grace)
            .map(|t| t.format(DEPARTURE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        text.push_str(&format!(
            "№{}.\n<i>Parking place:</i> <b>{}</b>\n<i>Departure time:</i> {departure}\n\n",
            position + 1,
            escape_html(&product.name),
        ));
    }

    Ok(Outcome::to(
        ConversationState::MainMenu,
        respond(event, text.trim_end(), back_keyboard()),
    ))
}

pub fn show_faq(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let faqs = {
        let db = turn.db()?;
        queries::list_faqs(&db)?
    };

    let mut text = "<b>Frequently asked questions:</b>\n".to_string();
    if faqs.is_empty() {
        text.push_str("\nNo questions yet.");
    }
    for (num, faq) in faqs.iter().enumerate() {
        text.push_str(&format!(
            "\n<b>№{} {}</b>\n<i>{}</i>\n",
            num + 1,
            escape_html(&faq.question),
            escape_html(&faq.answer)
        ));
    }

    Ok(Outcome::to(
        ConversationState::MainMenu,
        respond(event, text, back_keyboard()),
    ))
}

pub fn show_support(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    Ok(Outcome::to(
        ConversationState::MainMenu,
        respond(event, turn.settings.support_text.clone(), back_keyboard()),
    ))
}
