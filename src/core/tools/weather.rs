use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{Error, Result};
use crate::core::gateway::FunctionDeclaration;
use crate::core::tools::timezone::TimezoneLookup;

const FORECAST_BASE: &str = "https://api.open-meteo.com/v1/forecast";
const HISTORICAL_BASE: &str = "https://archive-api.open-meteo.com/v1/archive";

const DAILY_PARAMS: &str = "temperature_2m_max,temperature_2m_min,weather_code,\
wind_direction_10m_dominant,wind_speed_10m_max,precipitation_sum";

pub fn get_weather_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "get_weather",
        description: "Gets the weather for a given location",
        parameters: weather_parameters_schema(&["latitude", "longitude", "name"]),
    }
}

/// Shared parameter schema for the tools that end in a weather fetch.
pub fn weather_parameters_schema(required: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "message": {
                "type": "STRING",
                "description": "Human-readable message about finding the location (e.g., \"Looks like you want to know what to wear in New York, let me figure that out\")"
            },
            "name": {
                "type": "STRING",
                "description": "The name of the location"
            },
            "latitude": {
                "type": "NUMBER",
                "description": "The latitude, e.g. 40.7128"
            },
            "longitude": {
                "type": "NUMBER",
                "description": "The longitude, e.g. 74.0060"
            },
            "dateType": {
                "type": "STRING",
                "enum": ["default", "specific_dates", "historical_period"],
                "description": "default: next 7 days, specific_dates: within next 16 days, historical_period: beyond 16 days using historical data"
            },
            "startDate": {
                "type": "STRING",
                "description": "Start date in YYYY-MM-DD format. Only provide if dateType is specific_dates or historical_period"
            },
            "endDate": {
                "type": "STRING",
                "description": "End date in YYYY-MM-DD format. Only provide if dateType is specific_dates or historical_period"
            },
            "timeContext": {
                "type": "STRING",
                "description": "Human-readable time context: \"this weekend\", \"next week\", \"in December\", \"for Christmas\", etc. Leave empty if no specific time mentioned."
            }
        },
        "required": required
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateType {
    #[default]
    Default,
    SpecificDates,
    HistoricalPeriod,
}

/// Arguments of a `get_weather` / `confirm_location` call, as produced by the
/// model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub date_type: DateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub day: String,
    pub high: f64,
    pub low: f64,
    pub weather: &'static str,
}

/// The resolved weather payload: the request echoed back plus the per-day
/// forecast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date_type: DateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_context: Option<String>,
    pub forecast: Vec<DailyForecast>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(&self, request: &WeatherRequest) -> Result<WeatherData>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWindow {
    pub start: String,
    pub end: String,
    pub historical: bool,
}

/// Resolves the fetch window in the location's local time. Incomplete
/// specific/historical requests fall back to the default next-7-days window.
pub fn resolve_window(
    now_utc: DateTime<Utc>,
    offset_seconds: i32,
    request: &WeatherRequest,
) -> ResolvedWindow {
    match (
        request.date_type,
        request.start_date.as_deref(),
        request.end_date.as_deref(),
    ) {
        (DateType::SpecificDates, Some(start), Some(end)) => ResolvedWindow {
            start: start.to_string(),
            end: end.to_string(),
            historical: false,
        },
        (DateType::HistoricalPeriod, Some(start), Some(end)) => ResolvedWindow {
            start: start.to_string(),
            end: end.to_string(),
            historical: true,
        },
        _ => {
            let local_today = match FixedOffset::east_opt(offset_seconds) {
                Some(offset) => now_utc.with_timezone(&offset).date_naive(),
                None => now_utc.date_naive(),
            };
            ResolvedWindow {
                start: local_today.format("%Y-%m-%d").to_string(),
                end: (local_today + Duration::days(7)).format("%Y-%m-%d").to_string(),
                historical: false,
            }
        }
    }
}

/// Picks the regional forecast model best suited to the coordinate, or None
/// for the provider default.
pub fn pick_model(latitude: f64, longitude: f64) -> Option<&'static str> {
    let canada = (40.0..=85.0).contains(&latitude) && (-150.0..=-40.0).contains(&longitude);
    let alaska = (54.0..=72.0).contains(&latitude) && (-180.0..=-130.0).contains(&longitude);
    if canada || alaska {
        return Some("gem_seamless");
    }
    if (45.0..=56.0).contains(&latitude) && (2.0..=18.0).contains(&longitude) {
        return Some("icon_seamless");
    }
    if (38.0..=55.0).contains(&latitude) && (-10.0..=12.0).contains(&longitude) {
        return Some("meteofrance_seamless");
    }
    if (54.0..=72.0).contains(&latitude) && (2.0..=35.0).contains(&longitude) {
        return Some("metno_seamless");
    }
    if (20.0..=52.0).contains(&latitude) && (-130.0..=-60.0).contains(&longitude) {
        return Some("gfs_seamless");
    }
    None
}

/// WMO weather interpretation codes, as reported by Open-Meteo.
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snowfall",
        73 => "Moderate snowfall",
        75 => "Heavy snowfall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown conditions",
    }
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    daily: OpenMeteoDaily,
}

#[derive(Deserialize)]
struct OpenMeteoDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    weather_code: Vec<u32>,
}

/// Open-Meteo forecast/archive client. The timezone lookup feeds the default
/// date window; regional model selection is a pure function of the
/// coordinate.
pub struct OpenMeteoProvider {
    client: Client,
    timezone: Arc<dyn TimezoneLookup>,
}

impl OpenMeteoProvider {
    pub fn new(timezone: Arc<dyn TimezoneLookup>) -> Self {
        Self {
            client: Client::new(),
            timezone,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn forecast(&self, request: &WeatherRequest) -> Result<WeatherData> {
        let offset = self
            .timezone
            .utc_offset_seconds(request.latitude, request.longitude)
            .await?;
        let window = resolve_window(Utc::now(), offset, request);

        let base = if window.historical {
            HISTORICAL_BASE
        } else {
            FORECAST_BASE
        };
        let mut url = format!(
            "{}?wind_speed_unit=mph&temperature_unit=fahrenheit&precipitation_unit=inch\
             &daily={}&latitude={}&longitude={}&start_date={}&end_date={}",
            base, DAILY_PARAMS, request.latitude, request.longitude, window.start, window.end
        );
        if !window.historical {
            if let Some(model) = pick_model(request.latitude, request.longitude) {
                url.push_str("&models=");
                url.push_str(model);
            }
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::tool("get_weather", e))?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "weather fetch failed");
            return Err(Error::tool(
                "get_weather",
                format!("weather API returned {}", status),
            ));
        }
        let parsed: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| Error::tool("get_weather", e))?;

        let daily = parsed.daily;
        let forecast = daily
            .time
            .iter()
            .enumerate()
            .map(|(i, day)| DailyForecast {
                day: day.clone(),
                high: daily.temperature_2m_max.get(i).copied().unwrap_or(0.0),
                low: daily.temperature_2m_min.get(i).copied().unwrap_or(0.0),
                weather: describe_weather_code(daily.weather_code.get(i).copied().unwrap_or(u32::MAX)),
            })
            .collect();

        Ok(WeatherData {
            name: request.name.clone(),
            latitude: request.latitude,
            longitude: request.longitude,
            date_type: request.date_type,
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
            time_context: request.time_context.clone(),
            forecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(date_type: DateType, start: Option<&str>, end: Option<&str>) -> WeatherRequest {
        WeatherRequest {
            name: "Paris".into(),
            latitude: 48.85,
            longitude: 2.35,
            date_type,
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            time_context: None,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        "2024-06-10T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn default_window_is_local_today_plus_seven() {
        let window = resolve_window(fixed_now(), 0, &request(DateType::Default, None, None));
        assert_eq!(window.start, "2024-06-10");
        assert_eq!(window.end, "2024-06-17");
        assert!(!window.historical);
    }

    #[test]
    fn default_window_respects_negative_utc_offset() {
        // 00:00 UTC is still the previous day at UTC-5
        let window = resolve_window(
            fixed_now(),
            -5 * 3600,
            &request(DateType::Default, None, None),
        );
        assert_eq!(window.start, "2024-06-09");
        assert_eq!(window.end, "2024-06-16");
    }

    #[test]
    fn specific_dates_pass_through() {
        let window = resolve_window(
            fixed_now(),
            0,
            &request(DateType::SpecificDates, Some("2024-06-14"), Some("2024-06-16")),
        );
        assert_eq!(window.start, "2024-06-14");
        assert_eq!(window.end, "2024-06-16");
        assert!(!window.historical);
    }

    #[test]
    fn historical_period_uses_archive() {
        let window = resolve_window(
            fixed_now(),
            0,
            &request(DateType::HistoricalPeriod, Some("2023-12-20"), Some("2023-12-27")),
        );
        assert!(window.historical);
    }

    #[test]
    fn incomplete_specific_dates_fall_back_to_default() {
        let window = resolve_window(
            fixed_now(),
            0,
            &request(DateType::SpecificDates, Some("2024-06-14"), None),
        );
        assert_eq!(window.start, "2024-06-10");
        assert!(!window.historical);
    }

    #[test]
    fn regional_model_selection() {
        // Toronto is in the HRDPS box
        assert_eq!(pick_model(43.65, -79.38), Some("gem_seamless"));
        // Berlin: central Europe beats the France box by order
        assert_eq!(pick_model(52.52, 13.40), Some("icon_seamless"));
        // Madrid: France box only
        assert_eq!(pick_model(40.42, -3.70), Some("meteofrance_seamless"));
        // Oslo: nordic
        assert_eq!(pick_model(59.91, 10.75), Some("metno_seamless"));
        // Mexico City: just south of the US box
        assert_eq!(pick_model(19.43, -99.13), None);
        // Denver: US box
        assert_eq!(pick_model(39.74, -104.99), Some("gfs_seamless"));
        // Sydney: provider default
        assert_eq!(pick_model(-33.87, 151.21), None);
    }

    #[test]
    fn wmo_codes_map_to_descriptions() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(63), "Moderate rain");
        assert_eq!(describe_weather_code(95), "Thunderstorm");
        assert_eq!(describe_weather_code(42), "Unknown conditions");
    }

    #[test]
    fn request_decodes_from_camel_case_args() {
        let args = json!({
            "name": "I think New York!",
            "latitude": 40.7128,
            "longitude": -74.0060,
            "dateType": "specific_dates",
            "startDate": "2024-06-14",
            "endDate": "2024-06-16",
            "timeContext": "this weekend"
        });
        let request: WeatherRequest = serde_json::from_value(args).unwrap();
        assert_eq!(request.date_type, DateType::SpecificDates);
        assert_eq!(request.start_date.as_deref(), Some("2024-06-14"));
        assert_eq!(request.time_context.as_deref(), Some("this weekend"));
    }

    #[test]
    fn request_defaults_date_type_when_absent() {
        let args = json!({"name": "Oslo", "latitude": 59.91, "longitude": 10.75});
        let request: WeatherRequest = serde_json::from_value(args).unwrap();
        assert_eq!(request.date_type, DateType::Default);
    }

    #[test]
    fn weather_data_serializes_camel_case() {
        let data = WeatherData {
            name: "Paris".into(),
            latitude: 48.85,
            longitude: 2.35,
            date_type: DateType::Default,
            start_date: None,
            end_date: None,
            time_context: Some("next week".into()),
            forecast: vec![DailyForecast {
                day: "2024-06-10".into(),
                high: 75.0,
                low: 58.0,
                weather: "Partly cloudy",
            }],
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["dateType"], "default");
        assert_eq!(value["timeContext"], "next week");
        assert_eq!(value["forecast"][0]["weather"], "Partly cloudy");
        assert!(value.get("startDate").is_none());
    }
}
