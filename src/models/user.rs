use serde::{Deserialize, Serialize};

/// A chat user of the marketplace, keyed by their Telegram user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub telegram_user_id: String,
    pub chat_id: Option<i64>,
    pub username: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub car_number: Option<String>,
    pub car_serial_number: Option<String>,
    pub car_number_region: Option<i64>,
}

/// Profile fields a driver must fill in before reaching the main menu, in
/// the order they are asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    CarNumber,
    CarSerialNumber,
    CarRegion,
    Phone,
}

impl User {
    pub fn missing_field(&self) -> Option<ProfileField> {
        if self.car_number.is_none() {
            Some(ProfileField::CarNumber)
        } else if self.car_serial_number.is_none() {
            Some(ProfileField::CarSerialNumber)
        } else if self.car_number_region.is_none() {
            Some(ProfileField::CarRegion)
        } else if self.phone.is_none() {
            Some(ProfileField::Phone)
        } else {
            None
        }
    }
}

/// Identity of whoever sent an inbound event, as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub telegram_user_id: String,
    pub chat_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            telegram_user_id: "42".to_string(),
            chat_id: Some(42),
            username: "driver".to_string(),
            first_name: "Dana".to_string(),
            last_name: None,
            phone: None,
            car_number: None,
            car_serial_number: None,
            car_number_region: None,
        }
    }

    #[test]
    fn test_missing_fields_in_order() {
        let mut u = user();
        assert_eq!(u.missing_field(), Some(ProfileField::CarNumber));
        u.car_number = Some("123".to_string());
        assert_eq!(u.missing_field(), Some(ProfileField::CarSerialNumber));
        u.car_serial_number = Some("ABC".to_string());
        assert_eq!(u.missing_field(), Some(ProfileField::CarRegion));
        u.car_number_region = Some(2);
        assert_eq!(u.missing_field(), Some(ProfileField::Phone));
        u.phone = Some("+77010000000".to_string());
        assert_eq!(u.missing_field(), None);
    }
}
