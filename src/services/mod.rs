pub mod conversation;
pub mod dispatcher;
pub mod keyboard;
pub mod pairing;
pub mod sweeper;
pub mod transport;
