//! Localized placeholder texts shown instead of missing data.

use crate::model::{Language, Localized};

fn localized(fi: &str, en: &str) -> Localized<String> {
    Localized::from([(Language::Fi, fi.to_owned()), (Language::En, en.to_owned())])
}

/// Provider answered, but has no menu for today.
#[must_use]
pub fn no_menu_today() -> Localized<String> {
    localized("Ei ruokalistaa tälle päivälle.", "No menu for today.")
}

/// No menu has ever been fetched for the site.
#[must_use]
pub fn menu_unavailable() -> Localized<String> {
    localized(
        "Ruokalistatietoja ei ole saatavilla.",
        "No menu information available.",
    )
}

/// The announcement list is empty.
#[must_use]
pub fn no_announcements() -> Localized<String> {
    localized(
        "Tiedotteita ei ole saatavilla.",
        "No announcements available.",
    )
}
