use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::agents::{
    AttireAgent, ImageAnalysisAgent, LocationOutcome, Route, RouterAgent, WeatherAgent,
};
use crate::core::error::Result;
use crate::core::events::{
    CompleteData, FollowupData, LocationConfirmedData, LocationData, WorkflowEvent,
};
use crate::core::gateway::{ModelGateway, Part, Role};
use crate::core::memory::Memory;
use crate::core::tools::Toolbox;

/// Drives one inbound turn through the agent workflow, streaming events into
/// the channel as milestones land. Every user-visible text is persisted
/// before its event goes out, so an acknowledged message is always on disk.
pub struct Orchestrator {
    router: RouterAgent,
    weather: WeatherAgent,
    attire: AttireAgent,
    image: ImageAnalysisAgent,
    memory: Memory,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, toolbox: Toolbox, memory: Memory) -> Self {
        Self {
            router: RouterAgent::new(gateway.clone()),
            weather: WeatherAgent::new(gateway.clone(), toolbox.clone()),
            attire: AttireAgent::new(gateway.clone(), toolbox),
            image: ImageAnalysisAgent::new(gateway),
            memory,
        }
    }

    pub async fn run(
        mut self,
        prompt: String,
        image: Option<Vec<u8>>,
        tx: mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        if !prompt.is_empty() {
            self.memory.record(Role::User, Part::text(prompt)).await?;
        }
        match image {
            Some(image) => self.image_input(image, &tx).await,
            None => self.text_input(&tx).await,
        }
    }

    async fn text_input(&mut self, tx: &mpsc::Sender<WorkflowEvent>) -> Result<()> {
        let route = self.router.run(&mut self.memory).await?;

        match route {
            Route::DirectWeather => {
                self.complete(tx, None).await?;
            }
            Route::LocationDescription => {
                let outcome = self.weather.run(&mut self.memory).await?;
                match outcome {
                    LocationOutcome::Followup { question } => {
                        self.followup(tx, question).await?;
                    }
                    LocationOutcome::Confirmed { message, weather } => {
                        self.memory
                            .record(Role::Model, Part::text(message.clone()))
                            .await?;
                        self.emit(
                            tx,
                            WorkflowEvent::LocationConfirmed {
                                convo_id: self.memory.convo_id().to_string(),
                                data: LocationConfirmedData { message, weather },
                            },
                        )
                        .await;
                        self.complete(tx, None).await?;
                    }
                    // A bare weather fetch still reads as a confirmation in
                    // the text flow; the location name is the message.
                    LocationOutcome::Weather(weather) => {
                        let message = weather.name.clone();
                        self.memory
                            .record(Role::Model, Part::text(message.clone()))
                            .await?;
                        self.emit(
                            tx,
                            WorkflowEvent::LocationConfirmed {
                                convo_id: self.memory.convo_id().to_string(),
                                data: LocationConfirmedData { message, weather },
                            },
                        )
                        .await;
                        self.complete(tx, None).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn image_input(
        &mut self,
        image: Vec<u8>,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        let encoded = BASE64.encode(&image);
        let description = self.image.run(&mut self.memory, encoded).await?;
        info!(%description, "image analyzed");

        let outcome = self.weather.run(&mut self.memory).await?;
        match outcome {
            LocationOutcome::Followup { question } => {
                self.followup(tx, question).await?;
            }
            LocationOutcome::Confirmed { message, weather } => {
                self.memory
                    .record(Role::Model, Part::text(message.clone()))
                    .await?;
                self.emit(
                    tx,
                    WorkflowEvent::Location {
                        convo_id: self.memory.convo_id().to_string(),
                        data: LocationData { message },
                    },
                )
                .await;
                self.complete(tx, Some(weather.name)).await?;
            }
            LocationOutcome::Weather(weather) => {
                self.complete(tx, Some(weather.name)).await?;
            }
        }
        Ok(())
    }

    async fn followup(&mut self, tx: &mpsc::Sender<WorkflowEvent>, question: String) -> Result<()> {
        self.memory
            .record(Role::Model, Part::text(question.clone()))
            .await?;
        self.emit(
            tx,
            WorkflowEvent::Followup {
                convo_id: self.memory.convo_id().to_string(),
                data: FollowupData { question },
            },
        )
        .await;
        Ok(())
    }

    /// Runs the attire agent and closes the turn with a `complete` event.
    async fn complete(
        &mut self,
        tx: &mpsc::Sender<WorkflowEvent>,
        location_name: Option<String>,
    ) -> Result<()> {
        let attire = self.attire.run(&mut self.memory).await?;
        if !attire.recommendation.is_empty() {
            self.memory
                .record(Role::Model, Part::text(attire.recommendation.clone()))
                .await?;
        }
        self.emit(
            tx,
            WorkflowEvent::Complete {
                convo_id: self.memory.convo_id().to_string(),
                data: CompleteData {
                    recommendation: attire.recommendation,
                    listings: attire.listings,
                    location_name,
                },
            },
        )
        .await;
        Ok(())
    }

    /// A dropped receiver means the caller went away; the workflow still runs
    /// to completion so the transcript stays consistent.
    async fn emit(&self, tx: &mpsc::Sender<WorkflowEvent>, event: WorkflowEvent) {
        info!(action = event.action(), "workflow event");
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::core::error::Error;
    use crate::core::gateway::{GenerateRequest, ModelResponse};
    use crate::core::storage::Storage;
    use crate::core::tools::products::{ProductListing, ProductProvider};
    use crate::core::tools::search::SearchProvider;
    use crate::core::tools::weather::{DailyForecast, WeatherData, WeatherProvider, WeatherRequest};

    struct FakeGateway {
        responses: Mutex<VecDeque<ModelResponse>>,
    }

    impl FakeGateway {
        fn scripted(responses: Vec<ModelResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn generate(&self, _model: &str, _request: GenerateRequest) -> crate::core::error::Result<ModelResponse> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Model("script exhausted".to_string()))
        }
    }

    struct FakeSearch;

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(&self, _query: &str) -> crate::core::error::Result<String> {
            Ok(r#"[{"title":"City of Light - Wikipedia"}]"#.to_string())
        }
    }

    struct FakeWeather;

    #[async_trait]
    impl WeatherProvider for FakeWeather {
        async fn forecast(
            &self,
            request: &WeatherRequest,
        ) -> crate::core::error::Result<WeatherData> {
            Ok(WeatherData {
                name: request.name.clone(),
                latitude: request.latitude,
                longitude: request.longitude,
                date_type: request.date_type,
                start_date: request.start_date.clone(),
                end_date: request.end_date.clone(),
                time_context: request.time_context.clone(),
                forecast: vec![DailyForecast {
                    day: "2024-06-10".into(),
                    high: 72.0,
                    low: 55.0,
                    weather: "Partly cloudy",
                }],
            })
        }
    }

    struct FakeProducts;

    #[async_trait]
    impl ProductProvider for FakeProducts {
        async fn search(&self, _query: &str) -> crate::core::error::Result<Vec<ProductListing>> {
            Ok(vec![ProductListing {
                name: "Light Rain Jacket".into(),
                image_url: "https://img.example/jacket.jpg".into(),
                link: "https://www.amazon.com/dp/B000FAKE".into(),
            }])
        }
    }

    fn toolbox() -> Toolbox {
        Toolbox {
            search: Arc::new(FakeSearch),
            weather: Arc::new(FakeWeather),
            products: Arc::new(FakeProducts),
        }
    }

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            parts: vec![Part::text(text)],
        }
    }

    fn call_response(name: &str, args: serde_json::Value) -> ModelResponse {
        ModelResponse {
            parts: vec![Part::function_call(name, args)],
        }
    }

    fn confirm_paris() -> ModelResponse {
        call_response(
            "confirm_location",
            json!({
                "message": "Looks like you want to know what to wear in Paris!",
                "name": "Paris",
                "latitude": 48.85,
                "longitude": 2.35,
                "dateType": "default"
            }),
        )
    }

    async fn run_turn(
        storage: &Storage,
        user: &str,
        convo: &str,
        responses: Vec<ModelResponse>,
        prompt: &str,
        image: Option<Vec<u8>>,
    ) -> Vec<WorkflowEvent> {
        let memory = Memory::load(storage.clone(), user.to_string(), convo.to_string())
            .await
            .unwrap();
        let orchestrator =
            Orchestrator::new(FakeGateway::scripted(responses), toolbox(), memory);
        let (tx, mut rx) = mpsc::channel(32);
        orchestrator
            .run(prompt.to_string(), image, tx)
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn fixture() -> (Storage, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path().join("test.db")).unwrap();
        let user = storage.create_user("localhost", None).await.unwrap();
        (storage, user, dir)
    }

    #[tokio::test]
    async fn text_flow_emits_location_confirmed_then_complete() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                confirm_paris(),
                ModelResponse {
                    parts: vec![
                        Part::text("Light layers and comfortable shoes."),
                        Part::function_call("search_products", json!({"searchQuery": "light rain jacket"})),
                    ],
                },
            ],
            "What should I wear in the city of lights?",
            None,
        )
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action(), "location_confirmed");
        assert_eq!(events[1].action(), "complete");
        match &events[1] {
            WorkflowEvent::Complete { data, .. } => {
                assert_eq!(data.recommendation, "Light layers and comfortable shoes.");
                assert_eq!(data.listings.len(), 1);
                assert!(data.location_name.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // user-visible texts were persisted before the events went out
        let visible = storage.frontend_messages(&user, "c1").await.unwrap();
        let texts: Vec<&str> = visible.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "What should I wear in the city of lights?",
                "Looks like you want to know what to wear in Paris!",
                "Light layers and comfortable shoes.",
            ]
        );
    }

    #[tokio::test]
    async fn direct_weather_route_skips_location_resolution() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("direct_weather"),
                text_response("Same outfit works for the evening."),
            ],
            "what about tonight?",
            None,
        )
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action(), "complete");
    }

    #[tokio::test]
    async fn unrecognized_route_defaults_to_location_description() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("shrug"),
                call_response("ask_clarification", json!({"question": "Which city did you mean?"})),
            ],
            "hmm",
            None,
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::Followup { data, .. } => {
                assert_eq!(data.question, "Which city did you mean?");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn followup_pauses_and_a_later_turn_resumes() {
        let (storage, user, _dir) = fixture().await;
        let first = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                call_response("ask_clarification", json!({"question": "Snowy or sandy?"})),
            ],
            "my favorite vacation spot",
            None,
        )
        .await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].action(), "followup");

        let second = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                confirm_paris(),
                text_response("Pack a light jacket."),
            ],
            "sandy, Paris actually",
            None,
        )
        .await;
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].action(), "location_confirmed");
        assert_eq!(second[1].action(), "complete");

        // the resumed turn sees the paused turn's transcript
        let visible = storage.frontend_messages(&user, "c1").await.unwrap();
        assert_eq!(visible[0].text, "my favorite vacation spot");
        assert_eq!(visible[1].text, "Snowy or sandy?");
        assert_eq!(visible[2].text, "sandy, Paris actually");
    }

    #[tokio::test]
    async fn intermediate_tools_loop_until_terminal() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                call_response("web_search", json!({"searchString": "city of lights"})),
                call_response("get_history", json!({"last": 3})),
                confirm_paris(),
                text_response("Layers."),
            ],
            "the city of lights",
            None,
        )
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action(), "location_confirmed");
    }

    #[tokio::test]
    async fn tool_loop_cap_terminates_with_followup() {
        let (storage, user, _dir) = fixture().await;
        let mut responses = vec![text_response("location_description")];
        for _ in 0..6 {
            responses.push(call_response(
                "web_search",
                json!({"searchString": "again"}),
            ));
        }
        let events = run_turn(&storage, &user, "c1", responses, "riddle me this", None).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::Followup { data, .. } => {
                assert!(data.question.contains("rephrase"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn image_flow_emits_location_then_complete_with_name() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("The Eiffel Tower on a clear spring day, likely Paris."),
                confirm_paris(),
                text_response("A light trench coat."),
            ],
            "",
            Some(vec![0xff, 0xd8, 0xff]),
        )
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action(), "location");
        match &events[1] {
            WorkflowEvent::Complete { data, .. } => {
                assert_eq!(data.location_name.as_deref(), Some("Paris"));
                assert_eq!(data.recommendation, "A light trench coat.");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn image_flow_with_raw_weather_goes_straight_to_complete() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("A snowy mountain village, probably Oslo."),
                call_response(
                    "get_weather",
                    json!({"name": "Oslo", "latitude": 59.91, "longitude": 10.75}),
                ),
                text_response("Heavy coat and boots."),
            ],
            "",
            Some(vec![0xff, 0xd8, 0xff]),
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::Complete { data, .. } => {
                assert_eq!(data.location_name.as_deref(), Some("Oslo"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn raw_weather_in_text_flow_reads_as_location_confirmed() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                call_response(
                    "get_weather",
                    json!({"name": "Oslo", "latitude": 59.91, "longitude": 10.75}),
                ),
                text_response("Wool everything."),
            ],
            "Oslo next week",
            None,
        )
        .await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            WorkflowEvent::LocationConfirmed { data, .. } => {
                assert_eq!(data.message, "Oslo");
                assert_eq!(data.weather.name, "Oslo");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn plain_text_without_tool_call_is_an_implicit_followup() {
        let (storage, user, _dir) = fixture().await;
        let events = run_turn(
            &storage,
            &user,
            "c1",
            vec![
                text_response("location_description"),
                text_response("Do you mean Paris, Texas or Paris, France?"),
            ],
            "Paris",
            None,
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::Followup { data, .. } => {
                assert_eq!(data.question, "Do you mean Paris, Texas or Paris, France?");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_as_error() {
        let (storage, user, _dir) = fixture().await;
        let memory = Memory::load(storage.clone(), user.clone(), "c1".to_string())
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(FakeGateway::scripted(vec![]), toolbox(), memory);
        let (tx, _rx) = mpsc::channel(32);
        let result = orchestrator.run("Paris".to_string(), None, tx).await;
        assert!(matches!(result, Err(Error::Model(_))));

        // the user prompt was persisted before the failure
        let visible = storage.frontend_messages(&user, "c1").await.unwrap();
        assert_eq!(visible.len(), 1);
    }
}
