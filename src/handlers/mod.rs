pub mod callback_handlers;
