// State module - tab entity types

mod tab;
pub use tab::{
    display_name_for, ContentHandle, ParseColorError, TabColor, TabId, TabModel, TabOptions,
};
