//! Connection lifecycle owner.
//!
//! The bridge outlives connections: the stylesheet compiler and the render
//! scheduler belong to it, while everything a connection may have handed
//! out (component classes, rendering contexts, mounted components) lives in
//! a [`Session`] that is replaced on every open.

use crate::config::ReconnectPolicy;
use crate::css::RuleCompiler;
use crate::host::{Document, History, Renderer};
use crate::interpreter;
use crate::path::Path;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::scheduler::RenderScheduler;
use crate::session::Session;
use crate::spine::{ComponentPayload, Spine, SpineError};
use crate::transport::Transport;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

pub struct Bridge {
    document: Rc<dyn Document>,
    history: Rc<dyn History>,
    renderer: Rc<dyn Renderer>,
    styles: Rc<RefCell<RuleCompiler>>,
    scheduler: RenderScheduler,
    session: Option<Rc<Session>>,
    policy: ReconnectPolicy,
}

impl Bridge {
    pub fn new(
        document: Rc<dyn Document>,
        history: Rc<dyn History>,
        renderer: Rc<dyn Renderer>,
        policy: ReconnectPolicy,
    ) -> Self {
        let styles = Rc::new(RefCell::new(RuleCompiler::new(document.clone())));
        Self {
            document,
            history,
            renderer,
            styles,
            scheduler: RenderScheduler::default(),
            session: None,
            policy,
        }
    }

    pub fn session(&self) -> Option<&Rc<Session>> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Starts a connection with a fresh registry and root context, then
    /// reports the current location.
    pub fn open(&mut self, transport: Rc<dyn Transport>) -> Rc<Session> {
        if self.session.is_some() {
            warn!("opening a connection over a live session; discarding it");
        }

        let session = Session::new(transport, self.document.clone(), self.styles.clone());
        let location = self.history.current_path();
        info!(%location, "connection opened");
        session.send(ClientMessage::Location(location));

        self.session = Some(session.clone());
        session
    }

    pub fn handle_message(&mut self, raw: Value) {
        match ServerMessage::decode(raw) {
            Ok(ServerMessage::Spine(spine)) => self.schedule(spine),
            Ok(ServerMessage::Location(path)) => self.push_location(&path),
            Err(err) => warn!(error = %err, "ignoring server message"),
        }
    }

    fn schedule(&mut self, spine: Value) {
        if self.scheduler.push(spine) {
            self.renderer.request_frame();
        }
    }

    fn push_location(&self, path: &str) {
        if self.history.current_path() != path {
            debug!(path, "pushing location");
            self.history.push_path(path);
        }
    }

    /// Renders the latest pending spine at the root. Returns whether the
    /// host tree was replaced.
    pub fn frame(&mut self) -> bool {
        let Some(raw) = self.scheduler.take() else {
            return false;
        };
        let Some(session) = self.session.clone() else {
            debug!("dropping spine that arrived without a connection");
            return false;
        };

        let root = Path::root();
        let spine = match Spine::decode(&raw, &root) {
            Ok(spine) => spine,
            Err(err) => {
                log_decode_error("frame", &err);
                return false;
            }
        };

        let node = interpreter::render(&session, session.root_context(), &root, &spine, None);
        self.renderer.render_root(node);
        debug!(rules = self.styles.borrow().emitted(), "frame rendered");
        true
    }

    /// Replaces the payload of the component mounted at `path_key` and
    /// re-renders only that component. Returns whether one was found.
    pub fn render_spine_at_path(&self, path_key: &str, raw: &Value) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let Some(instance) = session.mounted_at(path_key) else {
            warn!(path = path_key, "no component mounted at path");
            return false;
        };

        match ComponentPayload::decode(raw, instance.path()) {
            Ok(payload) => {
                instance.set_payload(Rc::new(payload));
                self.renderer.update_component(&instance);
                true
            }
            Err(err) => {
                log_decode_error("component", &err);
                false
            }
        }
    }

    /// Renders head fragments with the root context and mirrors them into
    /// the document head. All fragments are decoded before any is rendered.
    pub fn render_head(&self, fragments: &[Value]) -> bool {
        let Some(session) = &self.session else {
            return false;
        };

        let root = Path::root();
        let spines = match fragments
            .iter()
            .map(|raw| Spine::decode(raw, &root))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(spines) => spines,
            Err(err) => {
                log_decode_error("head", &err);
                return false;
            }
        };

        let nodes = spines
            .iter()
            .map(|spine| interpreter::render(session, session.root_context(), &root, spine, None))
            .collect();
        self.renderer.render_head(nodes);
        true
    }

    /// The user navigated; report where to.
    pub fn pop_state(&self) {
        if let Some(session) = &self.session {
            session.send(ClientMessage::Location(self.history.current_path()));
        }
    }

    /// Orderly close. Returns whether to reconnect.
    pub fn close(&mut self) -> bool {
        let reconnect = self.disconnect(false);
        info!(reconnect, "connection closed");
        reconnect
    }

    /// Transport error. Returns whether to reconnect.
    pub fn fail(&mut self, reason: &str) -> bool {
        let reconnect = self.disconnect(true);
        warn!(reason, reconnect, "connection failed");
        reconnect
    }

    fn disconnect(&mut self, failed: bool) -> bool {
        if let Some(session) = self.session.take() {
            debug!(?session, "discarding session");
        }
        if self.scheduler.take().is_some() {
            debug!("dropping pending spine");
        }
        self.renderer.show_loading();
        self.policy.should_reconnect(failed)
    }
}

fn log_decode_error(scope: &str, err: &SpineError) {
    error!(
        scope,
        path = %err.path(),
        tag = err.tag().unwrap_or_default(),
        error = %err,
        "abandoning render"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessDocument, HeadlessHistory, HeadlessRenderer, RecordingTransport};
    use crate::host::History;
    use serde_json::json;

    struct Fixture {
        bridge: Bridge,
        history: Rc<HeadlessHistory>,
        renderer: Rc<HeadlessRenderer>,
        document: Rc<HeadlessDocument>,
    }

    impl Fixture {
        fn new(policy: ReconnectPolicy) -> Self {
            let document = Rc::new(HeadlessDocument::default());
            let history = Rc::new(HeadlessHistory::new("/start"));
            let renderer = Rc::new(HeadlessRenderer::new(document.clone()));
            Self {
                bridge: Bridge::new(document.clone(), history.clone(), renderer.clone(), policy),
                history,
                renderer,
                document,
            }
        }

        fn open(&mut self) -> Rc<RecordingTransport> {
            let transport = Rc::new(RecordingTransport::default());
            self.bridge.open(transport.clone());
            transport
        }

        fn push_and_frame(&mut self, message: Value) {
            self.bridge.handle_message(message);
            if self.renderer.take_frame_request() {
                self.bridge.frame();
            }
        }
    }

    fn counter(label: &str) -> Value {
        json!({
            "type": "Component",
            "id": 1,
            "displayName": "Counter",
            "spine": {
                "spine": {"tag": "span", "attributes": [], "children": [[0, label]]},
                "hooks": {"componentDidMount": [["Value0E", "Mounted"]]}
            }
        })
    }

    #[test]
    fn open_reports_current_location() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        let transport = fixture.open();
        assert_eq!(transport.sent_json(), vec![json!(["location", "/start"])]);
    }

    #[test]
    fn location_messages_push_only_when_changed() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        fixture.open();

        fixture.bridge.handle_message(json!(["location", "/start"]));
        fixture.bridge.handle_message(json!(["location", "/next"]));
        assert_eq!(fixture.history.pushed(), vec!["/next".to_string()]);
        assert_eq!(fixture.history.current_path(), "/next");
    }

    #[test]
    fn pop_state_reports_new_location() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        let transport = fixture.open();
        fixture.history.navigate("/back");
        fixture.bridge.pop_state();
        assert_eq!(transport.sent_json().last(), Some(&json!(["location", "/back"])));
    }

    #[test]
    fn spines_pushed_within_a_frame_render_once() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        fixture.open();

        fixture.bridge.handle_message(json!("A"));
        fixture.bridge.handle_message(json!(["spine", "B"]));
        fixture.bridge.handle_message(json!("C"));

        assert!(fixture.renderer.take_frame_request());
        assert!(!fixture.renderer.take_frame_request());
        assert!(fixture.bridge.frame());
        assert!(!fixture.bridge.frame());
        assert_eq!(fixture.renderer.to_html(), "<head></head><body>C</body>");
    }

    #[test]
    fn bad_spine_keeps_previous_tree() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        fixture.open();

        fixture.push_and_frame(json!({"tag": "p", "attributes": [], "children": [[0, "ok"]]}));
        fixture.push_and_frame(json!({"tag": "p", "attributes": [["AVAL", "id", "x"]], "children": [[0, {"type": "Portal"}]]}));
        fixture.push_and_frame(json!({"tag": "p", "attributes": [["AXXX"]], "children": []}));

        assert_eq!(fixture.renderer.to_html(), "<head></head><body><p>ok</p></body>");
    }

    #[test]
    fn reconnect_starts_with_a_fresh_registry() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        let first = fixture.open();
        fixture.push_and_frame(counter("one"));
        let first_class = fixture
            .bridge
            .session()
            .expect("session")
            .component_class(1, "Counter");

        assert!(fixture.bridge.close());
        assert!(fixture.renderer.is_loading());
        assert!(!fixture.bridge.is_open());

        let second = fixture.open();
        fixture.push_and_frame(counter("two"));
        let second_class = fixture
            .bridge
            .session()
            .expect("session")
            .component_class(1, "Counter");

        assert!(!Rc::ptr_eq(&first_class, &second_class));
        assert_eq!(
            first.sent_json(),
            vec![json!(["location", "/start"]), json!(["hook", [], ["Mounted"]])]
        );
        assert_eq!(
            second.sent_json(),
            vec![json!(["location", "/start"]), json!(["hook", [], ["Mounted"]])]
        );
        assert_eq!(fixture.renderer.to_html(), "<head></head><body><span>two</span></body>");
    }

    #[test]
    fn failure_reconnects_only_when_policy_allows() {
        let mut on_close = Fixture::new(ReconnectPolicy::OnClose);
        on_close.open();
        assert!(!on_close.bridge.fail("reset by peer"));

        let mut always = Fixture::new(ReconnectPolicy::Always);
        always.open();
        assert!(always.bridge.fail("reset by peer"));
    }

    #[test]
    fn stylesheet_survives_reconnect() {
        let mut fixture = Fixture::new(ReconnectPolicy::Always);
        let styled = json!({"tag": "b", "attributes": [["ASTY", [[1, "h9", [], [], {"fontWeight": 700}]]]], "children": []});

        fixture.open();
        fixture.push_and_frame(styled.clone());
        fixture.bridge.close();
        fixture.open();
        fixture.push_and_frame(styled);

        assert_eq!(fixture.document.rules(), vec![".sh9{font-weight:700}".to_string()]);
        assert_eq!(fixture.document.style_sheets_created(), 1);
    }

    #[test]
    fn addressed_rerender_updates_only_that_component() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        let transport = fixture.open();
        fixture.push_and_frame(json!({"tag": "div", "attributes": [], "children": [[2, counter("one")]]}));

        let delivered = fixture.bridge.render_spine_at_path(
            "2",
            &json!({"spine": {"tag": "span", "attributes": [], "children": [[0, "patched"]]}}),
        );
        assert!(delivered);
        assert_eq!(
            fixture.renderer.to_html(),
            "<head></head><body><div><span>patched</span></div></body>"
        );

        assert!(!fixture.bridge.render_spine_at_path("9", &json!({"spine": null})));
        assert!(!fixture.bridge.render_spine_at_path("2", &json!({"spine": {"type": "Bogus"}})));
        assert_eq!(
            transport.sent_json(),
            vec![json!(["location", "/start"]), json!(["hook", [2], ["Mounted"]])]
        );
    }

    #[test]
    fn head_fragments_render_into_the_head() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        fixture.open();
        assert!(fixture.bridge.render_head(&[
            json!({"tag": "title", "attributes": [], "children": [[0, "Inbox"]]}),
            json!({"tag": "meta", "attributes": [["AVAL", "name", "x"]], "children": []}),
        ]));
        assert_eq!(
            fixture.renderer.to_html(),
            r#"<head><title>Inbox</title><meta name="x"></head><body></body>"#
        );
    }

    #[test]
    fn close_unmounts_head_components_and_releases_the_session() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        let transport = fixture.open();
        assert!(fixture.bridge.render_head(&[json!({
            "type": "Component",
            "id": 4,
            "displayName": "Viewport",
            "spine": {
                "spine": {"tag": "meta", "attributes": [["AVAL", "name", "viewport"]], "children": []},
                "eventListeners": [[1, "resize"]],
                "hooks": {"componentWillUnmount": [["Value0E", "Gone"]]}
            }
        })]));

        let session = Rc::downgrade(fixture.bridge.session().expect("session"));
        assert_eq!(fixture.document.window_listener_count("resize"), 1);
        assert_eq!(fixture.renderer.mounted_components(), 1);

        fixture.bridge.close();

        assert!(session.upgrade().is_none());
        assert_eq!(fixture.document.window_listener_count("resize"), 0);
        assert_eq!(fixture.renderer.mounted_components(), 0);
        assert_eq!(
            fixture.document.dispatch_window_event("resize", &json!({"w": 1}).into()),
            0
        );
        assert_eq!(
            transport.sent_json(),
            vec![json!(["location", "/start"]), json!(["hook", [], ["Gone"]])]
        );
        assert_eq!(
            fixture.renderer.to_html(),
            r#"<head></head><body><div class="spine-loading">Loading...</div></body>"#
        );
    }

    #[test]
    fn unknown_server_messages_are_ignored() {
        let mut fixture = Fixture::new(ReconnectPolicy::OnClose);
        fixture.open();
        fixture.bridge.handle_message(json!(["reload"]));
        assert!(!fixture.renderer.take_frame_request());
    }
}
