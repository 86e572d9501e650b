//! Menu provider for Food & Co canteens using the Compass Group week-menu API.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use metrohelp_core::{
    model::{Chain, Language, Localized, MenuCourse, MenuResult},
    ports::{FetchFailure, MenuPort, fetch_json},
};

const BASE_URL: &str = "https://www.compass-group.fi/menuapi/week-menus";
const PROVIDER_TITLE: &str = "Food & Co";
const DATE_FORMAT: &str = "%Y-%m-%d";

// Food & Co leaves some packages unpriced; these are the student/staff/guest
// prices printed at the counters.
const DEFAULT_PRICE: &str = "2,95 € / 6,50 € / 7,85 €";

const DIET_LEGEND_FI: &str = "(G) Gluteeniton, (L) Laktoositon, (VL) Vähälaktoosinen, \
    (M) Maidoton, (*) Suomalaisten ravitsemussuositusten mukainen, \
    (Veg) Soveltuu vegaaniruokavalioon, (ILM) Ilmastoystävällinen, \
    (VS) Sis. tuoretta valkosipulia, (A) Sis. allergeeneja";
const DIET_LEGEND_EN: &str = "(G) Gluten-free, (L) Lactose-free, (VL) Low lactose, \
    (M) Milk-free, (*) Complies with the Finnish nutrition recommendations, \
    (Veg) Suitable for vegans, (ILM) Climate-friendly, \
    (VS) Contains fresh garlic, (A) Contains allergens";

/// Response of /week-menus
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekMenu {
    menus: Vec<DayMenu>,
}

/// One weekday inside `WeekMenu.menus`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayMenu {
    date: String, // "2024-03-12T00:00:00+02:00"
    #[serde(default)]
    menu_packages: Vec<MenuPackage>,
}

/// Meal package, e.g. "Lounas" or "Kasvislounas"
#[derive(Debug, Deserialize)]
struct MenuPackage {
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    meals: Vec<Meal>,
}

/// Single dish inside a package
#[derive(Debug, Deserialize)]
struct Meal {
    name: String,
    #[serde(default)]
    diets: Vec<String>,
}

/// Menu lookups for Food & Co restaurants.
pub struct FoodCoMenuPort {
    client: Client,
}

impl FoodCoMenuPort {
    /// Create a new menu port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn week_menu(
        &self,
        restaurant_id: u32,
        date: NaiveDate,
        language: Language,
    ) -> Result<WeekMenu, FetchFailure> {
        let date = date.format(DATE_FORMAT).to_string();
        let req = self.client.get(BASE_URL).query(&[
            ("costCenter", restaurant_id.to_string().as_str()),
            ("language", language.code()),
            ("date", date.as_str()),
        ]);
        fetch_json(req).await
    }
}

#[async_trait]
impl MenuPort for FoodCoMenuPort {
    fn chain(&self) -> Chain {
        Chain::FoodAndCo
    }

    async fn daily_menu(
        &self,
        restaurant_id: u32,
        date: NaiveDate,
    ) -> Result<MenuResult, FetchFailure> {
        // The API localizes names per request, so fetch the week once per language.
        let finnish = self.week_menu(restaurant_id, date, Language::Fi).await?;
        let english = self.week_menu(restaurant_id, date, Language::En).await?;
        Ok(normalize(&finnish, &english, date))
    }
}

/// Build the menu port for Food & Co.
#[must_use]
pub fn port(client: Client) -> Arc<dyn MenuPort> {
    Arc::new(FoodCoMenuPort::new(client))
}

fn normalize(finnish: &WeekMenu, english: &WeekMenu, date: NaiveDate) -> MenuResult {
    let Some(day_fi) = day_of(finnish, date) else {
        return MenuResult::no_menu_today(PROVIDER_TITLE);
    };
    let packages_en = day_of(english, date).map_or(&[][..], |day| day.menu_packages.as_slice());

    let courses: Vec<MenuCourse> = day_fi
        .menu_packages
        .iter()
        .enumerate()
        .filter(|(_, package)| !package.meals.is_empty())
        .map(|(index, package)| {
            let mut name = Localized::new();
            name.insert(Language::Fi, meal_sentence(&package.meals, Language::Fi));
            if let Some(package_en) = packages_en.get(index).filter(|pkg| !pkg.meals.is_empty()) {
                name.insert(Language::En, meal_sentence(&package_en.meals, Language::En));
            }

            MenuCourse {
                name,
                diet_codes: shared_diets(&package.meals),
                price: Some(
                    package
                        .price
                        .as_deref()
                        .map(str::trim)
                        .filter(|price| !price.is_empty())
                        .unwrap_or(DEFAULT_PRICE)
                        .to_owned(),
                ),
            }
        })
        .collect();

    if courses.is_empty() {
        return MenuResult::no_menu_today(PROVIDER_TITLE);
    }

    MenuResult {
        provider_title: PROVIDER_TITLE.to_owned(),
        courses,
        diet_code_explanations: Localized::from([
            (Language::Fi, DIET_LEGEND_FI.to_owned()),
            (Language::En, DIET_LEGEND_EN.to_owned()),
        ]),
    }
}

fn day_of(week: &WeekMenu, date: NaiveDate) -> Option<&DayMenu> {
    week.menus.iter().find(|day| {
        day.date
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
            == Some(date)
    })
}

/// Join meal names into one sentence, e.g. "Broileria, riisiä ja salaattia".
fn meal_sentence(meals: &[Meal], language: Language) -> String {
    let names: Vec<String> = meals
        .iter()
        .map(|meal| meal.name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let conjunction = match language {
        Language::Fi => "ja",
        Language::En => "and",
    };

    let sentence = match names.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, head)) => format!("{} {conjunction} {last}", head.join(", ")),
    };
    capitalize_first(&sentence)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Diet codes carried by every meal of a package.
fn shared_diets(meals: &[Meal]) -> BTreeSet<String> {
    let mut sets = meals.iter().map(|meal| {
        meal.diets
            .iter()
            .map(|code| code.trim().to_owned())
            .filter(|code| !code.is_empty())
            .collect::<BTreeSet<String>>()
    });
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    sets.fold(first, |shared, diets| {
        shared.intersection(&diets).cloned().collect()
    })
}
