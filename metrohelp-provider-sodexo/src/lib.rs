//! Menu provider for Sodexo canteens using the daily JSON output.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use metrohelp_core::{
    model::{Chain, Language, Localized, MenuCourse, MenuResult},
    ports::{FetchFailure, MenuPort, fetch_json},
};

const BASE_URL: &str = "https://www.sodexo.fi/ruokalistat/output/daily_json";
const PROVIDER_TITLE: &str = "Sodexo";
const DATE_FORMAT: &str = "%Y-%m-%d";
const VEGAN_CODE: &str = "VEG";

const DIET_LEGEND_FI: &str =
    "(G) Gluteeniton, (L) Laktoositon, (M) Maidoton, (VEG) Vegaaninen, (VL) Vähälaktoosinen";
const DIET_LEGEND_EN: &str =
    "(G) Gluten free, (L) Lactose free, (M) Milk free, (VEG) Vegan, (VL) Low lactose";

/// Response from /daily_json/{id}/{date}
#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(default)]
    courses: Option<Courses>,
    // "meta" carries the restaurant name and generation time, not needed here
}

/// Sodexo sends courses as an object keyed "1", "2", ... and as `[]` on empty days.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Courses {
    Keyed(BTreeMap<String, Course>),
    Listed(Vec<Course>),
}

/// Single course inside `DailyResponse.courses`
#[derive(Debug, Deserialize)]
struct Course {
    #[serde(default)]
    title_fi: Option<String>,
    #[serde(default)]
    title_en: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    dietcodes: Option<String>, // "M, G"
    #[serde(default)]
    price: Option<String>,
}

/// Menu lookups for Sodexo restaurants.
pub struct SodexoMenuPort {
    client: Client,
}

impl SodexoMenuPort {
    /// Create a new menu port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MenuPort for SodexoMenuPort {
    fn chain(&self) -> Chain {
        Chain::Sodexo
    }

    async fn daily_menu(
        &self,
        restaurant_id: u32,
        date: NaiveDate,
    ) -> Result<MenuResult, FetchFailure> {
        let url = format!("{BASE_URL}/{restaurant_id}/{}", date.format(DATE_FORMAT));
        let daily = fetch_json::<DailyResponse>(self.client.get(url)).await?;
        Ok(normalize(daily))
    }
}

/// Build the menu port for Sodexo.
#[must_use]
pub fn port(client: Client) -> Arc<dyn MenuPort> {
    Arc::new(SodexoMenuPort::new(client))
}

fn normalize(daily: DailyResponse) -> MenuResult {
    let courses: Vec<MenuCourse> = ordered_courses(daily.courses)
        .into_iter()
        .filter_map(map_course)
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

fn ordered_courses(courses: Option<Courses>) -> Vec<Course> {
    match courses {
        None => Vec::new(),
        Some(Courses::Listed(list)) => list,
        Some(Courses::Keyed(keyed)) => {
            let mut entries: Vec<(String, Course)> = keyed.into_iter().collect();
            // Keys are positions; "10" must sort after "9".
            entries.sort_by_key(|(key, _)| (key.parse::<u32>().unwrap_or(u32::MAX), key.clone()));
            entries.into_iter().map(|(_, course)| course).collect()
        }
    }
}

fn map_course(course: Course) -> Option<MenuCourse> {
    let mut name = Localized::new();
    for (language, title) in [(Language::Fi, course.title_fi), (Language::En, course.title_en)] {
        if let Some(title) = title.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty()) {
            name.insert(language, title);
        }
    }
    if name.is_empty() {
        return None;
    }

    let mut diet_codes = parse_diet_codes(course.dietcodes.as_deref().unwrap_or_default());
    if course
        .category
        .as_deref()
        .is_some_and(|category| category.to_lowercase().contains("vegan"))
    {
        diet_codes.insert(VEGAN_CODE.to_owned());
    }

    Some(MenuCourse {
        name,
        diet_codes,
        price: course.price.filter(|price| !price.trim().is_empty()),
    })
}

fn parse_diet_codes(raw: &str) -> BTreeSet<String> {
    raw.to_uppercase()
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_owned)
        .collect()
}
