mod purchase_event;
mod sale_moment;

pub use purchase_event::{decode_purchase_event, PurchaseEvent, PurchaseEventError};
pub use sale_moment::{decode_sale_moment, DecodeError, SaleMoment};
