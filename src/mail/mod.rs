pub mod decoders;
pub mod extract;
pub mod html;
pub mod imap_client;
pub mod smtp;
