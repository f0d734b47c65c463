//! Entry point of the dialogue and the driver profile questionnaire.

use super::catalog::main_menu_keyboard;
use super::effect::escape_html;
use super::{Effect, Event, Outcome, Turn};
use crate::db::queries::{self, ProfileUpdate};
use crate::errors::BotError;
use crate::models::{ConversationContext, ConversationState, ProfileField, User};
use crate::services::keyboard::Keyboard;

fn prompt(field: ProfileField) -> Outcome {
    let (state, text, keyboard) = match field {
        ProfileField::CarNumber => (
            ConversationState::AwaitingCarNumber,
            "Let's register your car first.\nEnter the three digits of your licence plate:",
            None,
        ),
        ProfileField::CarSerialNumber => (
            ConversationState::AwaitingCarSerial,
            "Enter the letters of your licence plate:",
            None,
        ),
        ProfileField::CarRegion => (
            ConversationState::AwaitingCarRegion,
            "Enter the region code of your licence plate:",
            None,
        ),
        ProfileField::Phone => (
            ConversationState::AwaitingPhone,
            "Share your phone number so we can reach you:",
            Some(Keyboard::RequestContact {
                label: "📱 Share phone number".to_string(),
            }),
        ),
    };
    Outcome::to(
        state,
        vec![Effect::SendText {
            text: text.to_string(),
            keyboard,
        }],
    )
}

fn greeting(user: &User) -> Vec<Effect> {
    vec![
        Effect::text_with(
            format!(
                "Hello, {}! Welcome to the parking service.",
                escape_html(&user.first_name)
            ),
            Keyboard::Remove,
        ),
        Effect::text_with("Choose an action:", main_menu_keyboard()),
    ]
}

/// Ask for the next missing profile field, or open the main menu.
fn next_step(user: &User) -> Outcome {
    match user.missing_field() {
        Some(field) => prompt(field),
        None => Outcome::to(ConversationState::MainMenu, greeting(user)),
    }
}

pub fn start(
    turn: &Turn,
    ctx: &mut ConversationContext,
    _event: &Event,
) -> Result<Outcome, BotError> {
    ctx.user_data = Default::default();
    let user = {
        let db = turn.db()?;
        queries::get_or_create_user(&db, turn.sender)?
    };
    Ok(next_step(&user))
}

pub fn cancel(
    _turn: &Turn,
    ctx: &mut ConversationContext,
    _event: &Event,
) -> Result<Outcome, BotError> {
    ctx.end();
    Ok(Outcome::to(
        ConversationState::Idle,
        vec![Effect::text_with(
            "Bye! I hope we can talk again some day.",
            Keyboard::Remove,
        )],
    ))
}

fn save(turn: &Turn, update: ProfileUpdate) -> Result<User, BotError> {
    let db = turn.db()?;
    queries::get_or_create_user(&db, turn.sender)?;
    queries::update_user_profile(&db, &turn.sender.telegram_user_id, update)?
        .ok_or_else(|| BotError::NotFound(format!("user {}", turn.sender.telegram_user_id)))
}

fn text_of(event: &Event) -> &str {
    match event {
        Event::TextMessage(text) => text.trim(),
        _ => "",
    }
}

pub fn validate_car_number(input: &str) -> Result<&str, BotError> {
    if !input.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(BotError::Validation(
            "The plate number must be a number.\nEnter the three digits of your licence plate:"
                .to_string(),
        ));
    }
    if input.len() != 3 || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(BotError::Validation(
            "The plate number must be exactly three digits.\nEnter the three digits of your licence plate:"
                .to_string(),
        ));
    }
    Ok(input)
}

pub fn validate_car_serial(input: &str) -> Result<String, BotError> {
    let len = input.chars().count();
    if len == 0 || len > 3 || input.chars().any(char::is_whitespace) {
        return Err(BotError::Validation(
            "The plate letters must be one to three characters.\nEnter the letters of your licence plate:"
                .to_string(),
        ));
    }
    Ok(input.to_uppercase())
}

pub fn validate_car_region(input: &str) -> Result<i64, BotError> {
    let invalid = || {
        BotError::Validation(
            "This region does not exist.\nEnter the region code of your licence plate:".to_string(),
        )
    };
    if input.is_empty() || input.len() > 2 || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    match input.parse::<i64>() {
        Ok(region) if region > 0 => Ok(region),
        _ => Err(invalid()),
    }
}

pub fn car_number(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let number = validate_car_number(text_of(event))?;
    let user = save(turn, ProfileUpdate::CarNumber(number))?;
    Ok(next_step(&user))
}

pub fn car_serial(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let serial = validate_car_serial(text_of(event))?;
    let user = save(turn, ProfileUpdate::CarSerialNumber(&serial))?;
    Ok(next_step(&user))
}

pub fn car_region(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let region = validate_car_region(text_of(event))?;
    let user = save(turn, ProfileUpdate::CarRegion(region))?;
    Ok(next_step(&user))
}

pub fn phone(
    turn: &Turn,
    _ctx: &mut ConversationContext,
    event: &Event,
) -> Result<Outcome, BotError> {
    let Event::ContactShared {
        phone,
        first_name,
        last_name,
    } = event
    else {
        return Err(BotError::Validation(
            "Use the button below to share your phone number.".to_string(),
        ));
    };

    let user = save(
        turn,
        ProfileUpdate::Phone {
            phone,
            first_name,
            last_name: last_name.as_deref(),
        },
    )?;
    Ok(next_step(&user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_car_number() {
        assert_eq!(validate_car_number("123").unwrap(), "123");
        let err = validate_car_number("abc").unwrap_err().user_message();
        assert!(err.contains("must be a number"));
        let err = validate_car_number("12").unwrap_err().user_message();
        assert!(err.contains("exactly three digits"));
        assert!(validate_car_number("1234").is_err());
        assert!(validate_car_number("12a").is_err());
    }

    #[test]
    fn test_car_serial_uppercased() {
        assert_eq!(validate_car_serial("abc").unwrap(), "ABC");
        assert_eq!(validate_car_serial("k").unwrap(), "K");
        assert!(validate_car_serial("").is_err());
        assert!(validate_car_serial("abcd").is_err());
        assert!(validate_car_serial("a b").is_err());
    }

    #[test]
    fn test_car_region() {
        assert_eq!(validate_car_region("2").unwrap(), 2);
        assert_eq!(validate_car_region("17").unwrap(), 17);
        for bad in ["0", "00", "100", "x", ""] {
            assert!(validate_car_region(bad).is_err(), "{bad} accepted");
        }
    }
}
