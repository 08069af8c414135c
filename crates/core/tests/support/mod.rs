//! Simulated browser driver for integration tests.
//!
//! `SimWorld` is a declarative description of a small web: routes map URLs
//! to a status, a DOM, load-phase timings, and timed mutations. `SimBrowser`
//! implements the driver traits on top of it, so the orchestrator can be
//! exercised end to end without a browser, with deterministic timing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tiller::{
    Action, BoundingBox, BrowserDriver, ConsoleKind, ConsoleMessage, ContextDriver, DialogInfo,
    DialogKind, DriverError, EventSink, LoadPhase, NavigationOutcome, PageDriver, PageEvent,
    RawElement, SessionOptions, StorageState,
};

type DriverResult<T> = std::result::Result<T, DriverError>;

/// Builder for one simulated element.
#[derive(Debug, Clone)]
pub struct Elem {
    pub selectors: Vec<String>,
    pub text: String,
    pub value: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    pub bbox: Option<BoundingBox>,
    pub children: Vec<Elem>,
    pub on_click: Option<ClickEffect>,
}

/// What clicking an element does to the simulated world.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Open the route as a popup page in the same context.
    OpenPopup(String),
    /// Navigate the clicked page to the route.
    Navigate(String),
    /// Store a value into the context's storage blob under a key.
    SetStorage(String, serde_json::Value),
    /// Raise a native dialog.
    RaiseDialog(DialogKind, String),
    /// Emit a console message.
    EmitConsole(ConsoleKind, String),
}

pub fn el(selector: &str) -> Elem {
    Elem {
        selectors: vec![selector.to_string()],
        text: String::new(),
        value: None,
        visible: true,
        enabled: true,
        bbox: Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 20.0,
        }),
        children: Vec::new(),
        on_click: None,
    }
}

impl Elem {
    pub fn also_matches(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        let b = self.bbox.get_or_insert(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 20.0,
        });
        b.x = x;
        b.y = y;
        self
    }

    pub fn child(mut self, child: Elem) -> Self {
        self.children.push(child);
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }
}

/// A timed change to a page's live DOM, applied after navigation.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Add a new element to the document.
    Add(Elem),
    /// Detach every element matching the selector.
    Remove(String),
    /// Make matching elements visible.
    Show(String),
    /// Enable matching elements.
    Enable(String),
    /// Move matching elements to a new origin.
    MoveTo(String, f64, f64),
    /// Detach matching elements and attach a replacement (fresh node id).
    Replace(String, Elem),
    /// Emit a console message from the page.
    Console(ConsoleKind, String),
}

/// One route in the simulated web.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub status_text: String,
    pub elements: Vec<Elem>,
    pub dom_ready_after: Duration,
    pub network_idle_after: Option<Duration>,
    pub mutations: Vec<(Duration, Mutation)>,
}

pub fn route() -> Route {
    Route {
        status: 200,
        status_text: "OK".to_string(),
        elements: Vec::new(),
        dom_ready_after: Duration::ZERO,
        network_idle_after: Some(Duration::ZERO),
        mutations: Vec::new(),
    }
}

impl Route {
    pub fn status(mut self, status: u16, text: &str) -> Self {
        self.status = status;
        self.status_text = text.to_string();
        self
    }

    pub fn element(mut self, e: Elem) -> Self {
        self.elements.push(e);
        self
    }

    pub fn dom_ready_after(mut self, after: Duration) -> Self {
        self.dom_ready_after = after;
        self
    }

    pub fn network_idle_after(mut self, after: Duration) -> Self {
        self.network_idle_after = Some(after);
        self
    }

    /// The route never reaches network idle.
    pub fn never_idle(mut self) -> Self {
        self.network_idle_after = None;
        self
    }

    pub fn mutate_after(mut self, after: Duration, mutation: Mutation) -> Self {
        self.mutations.push((after, mutation));
        self
    }
}

/// The simulated web shared by every context of one [`SimBrowser`].
#[derive(Default)]
pub struct SimWorld {
    routes: Mutex<HashMap<String, Route>>,
    next_node_id: AtomicU64,
    quiet_close: AtomicBool,
}

impl SimWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            next_node_id: AtomicU64::new(1),
            quiet_close: AtomicBool::new(false),
        })
    }

    pub fn route(self: &Arc<Self>, url: &str, spec: Route) -> Arc<Self> {
        self.routes.lock().insert(url.to_string(), spec);
        Arc::clone(self)
    }

    /// Pages close without echoing a `Closed` event, like a driver that
    /// only reports browser-initiated closes.
    pub fn quiet_close(self: &Arc<Self>) -> Arc<Self> {
        self.quiet_close.store(true, Ordering::SeqCst);
        Arc::clone(self)
    }

    fn lookup(&self, url: &str) -> Option<Route> {
        self.routes.lock().get(url).cloned()
    }

    fn next_id(&self) -> u64 {
        self.next_node_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Live instance of one element on a page.
#[derive(Debug, Clone)]
struct LiveElem {
    node_id: u64,
    selectors: Vec<String>,
    text: String,
    value: Option<String>,
    visible: bool,
    enabled: bool,
    attached: bool,
    bbox: Option<BoundingBox>,
    children: Vec<LiveElem>,
    on_click: Option<ClickEffect>,
}

impl LiveElem {
    fn instantiate(world: &SimWorld, spec: &Elem) -> Self {
        Self {
            node_id: world.next_id(),
            selectors: spec.selectors.clone(),
            text: spec.text.clone(),
            value: spec.value.clone(),
            visible: spec.visible,
            enabled: spec.enabled,
            attached: true,
            bbox: spec.bbox,
            children: spec.children.iter().map(|c| Self::instantiate(world, c)).collect(),
            on_click: spec.on_click.clone(),
        }
    }

    fn snapshot(&self) -> RawElement {
        RawElement {
            node_id: self.node_id,
            attached: self.attached,
            visible: self.visible,
            enabled: self.enabled,
            bounding_box: self.bbox,
            text: self.text.clone(),
            value: self.value.clone(),
        }
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

fn collect<'a>(elems: &'a [LiveElem], selector: &str, out: &mut Vec<&'a LiveElem>) {
    for e in elems {
        if e.matches(selector) {
            out.push(e);
        }
        collect(&e.children, selector, out);
    }
}

fn collect_mut<'a>(elems: &'a mut [LiveElem], selector: &str, out: &mut Vec<&'a mut LiveElem>) {
    for e in elems {
        if e.matches(selector) {
            out.push(e);
            continue;
        }
        collect_mut(&mut e.children, selector, out);
    }
}

fn find_by_id<'a>(elems: &'a [LiveElem], id: u64) -> Option<&'a LiveElem> {
    for e in elems {
        if e.node_id == id {
            return Some(e);
        }
        if let Some(found) = find_by_id(&e.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_by_id_mut<'a>(elems: &'a mut [LiveElem], id: u64) -> Option<&'a mut LiveElem> {
    for e in elems {
        if e.node_id == id {
            return Some(e);
        }
        if let Some(found) = find_by_id_mut(&mut e.children, id) {
            return Some(found);
        }
    }
    None
}

/// One simulated browser over a shared [`SimWorld`].
pub struct SimBrowser {
    world: Arc<SimWorld>,
}

impl SimBrowser {
    pub fn new(world: Arc<SimWorld>) -> Arc<Self> {
        Arc::new(Self { world })
    }
}

impl BrowserDriver for SimBrowser {
    fn open_session(&self, options: &SessionOptions) -> DriverResult<Arc<dyn ContextDriver>> {
        let storage = options
            .storage_state
            .clone()
            .map(|s| s.0)
            .unwrap_or(serde_json::Value::Null);
        let context = Arc::new(SimContext {
            world: Arc::clone(&self.world),
            storage: Mutex::new(storage),
            closed: AtomicBool::new(false),
            self_weak: Mutex::new(Weak::new()),
        });
        *context.self_weak.lock() = Arc::downgrade(&context);
        Ok(context)
    }
}

/// One isolation context: owns a private storage blob.
pub struct SimContext {
    world: Arc<SimWorld>,
    storage: Mutex<serde_json::Value>,
    closed: AtomicBool,
    self_weak: Mutex<Weak<SimContext>>,
}

impl ContextDriver for SimContext {
    fn new_page(&self) -> DriverResult<Arc<dyn PageDriver>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::TargetClosed("context".to_string()));
        }
        let page: Arc<dyn PageDriver> =
            SimPage::blank(Arc::clone(&self.world), self.self_weak.lock().clone());
        Ok(page)
    }

    fn storage_state(&self) -> DriverResult<StorageState> {
        Ok(StorageState(self.storage.lock().clone()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct DocState {
    url: String,
    dom: Vec<LiveElem>,
    epoch: u64,
}

enum SimTask {
    Load(LoadPhase),
    Mutate(Mutation),
}

/// One simulated page. Emits events through every registered sink.
pub struct SimPage {
    world: Arc<SimWorld>,
    state: Mutex<DocState>,
    sinks: Mutex<Vec<EventSink>>,
    closed: AtomicBool,
    actions: Mutex<Vec<(u64, String)>>,
    context: Weak<SimContext>,
    self_weak: Mutex<Weak<SimPage>>,
}

impl SimPage {
    fn blank(world: Arc<SimWorld>, context: Weak<SimContext>) -> Arc<Self> {
        let page = Arc::new(Self {
            world,
            state: Mutex::new(DocState {
                url: "about:blank".to_string(),
                dom: Vec::new(),
                epoch: 0,
            }),
            sinks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            actions: Mutex::new(Vec::new()),
            context,
            self_weak: Mutex::new(Weak::new()),
        });
        *page.self_weak.lock() = Arc::downgrade(&page);
        page
    }

    /// Actions performed so far, as (node_id, action name) pairs.
    pub fn performed(&self) -> Vec<(u64, String)> {
        self.actions.lock().clone()
    }

    fn emit(&self, event: PageEvent) {
        let sinks: Vec<EventSink> = self.sinks.lock().clone();
        for sink in sinks {
            sink(event.clone());
        }
    }

    /// Loads a route into this page: swaps the DOM, emits `Navigated`, and
    /// schedules load phases and mutations.
    fn load_route(&self, url: &str, spec: &Route) {
        let epoch = {
            let mut state = self.state.lock();
            state.url = url.to_string();
            state.epoch += 1;
            state.dom = spec
                .elements
                .iter()
                .map(|e| LiveElem::instantiate(&self.world, e))
                .collect();
            state.epoch
        };
        self.emit(PageEvent::Navigated { url: url.to_string() });

        self.schedule(epoch, spec.dom_ready_after, SimTask::Load(LoadPhase::DomReady));
        if let Some(after) = spec.network_idle_after {
            self.schedule(epoch, after, SimTask::Load(LoadPhase::NetworkIdle));
        }
        for (after, mutation) in &spec.mutations {
            self.schedule(epoch, *after, SimTask::Mutate(mutation.clone()));
        }
    }

    fn schedule(&self, epoch: u64, after: Duration, task: SimTask) {
        if after.is_zero() {
            self.run_task(epoch, task);
            return;
        }
        let weak = self.self_weak.lock().clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(page) = weak.upgrade() {
                page.run_task(epoch, task);
            }
        });
    }

    fn run_task(&self, epoch: u64, task: SimTask) {
        if self.closed.load(Ordering::SeqCst) || self.state.lock().epoch != epoch {
            return;
        }
        match task {
            SimTask::Load(phase) => self.emit(PageEvent::Load(phase)),
            SimTask::Mutate(mutation) => self.apply(mutation),
        }
    }

    fn apply(&self, mutation: Mutation) {
        match mutation {
            Mutation::Add(spec) => {
                let live = LiveElem::instantiate(&self.world, &spec);
                self.state.lock().dom.push(live);
            }
            Mutation::Remove(selector) => {
                let mut state = self.state.lock();
                let mut found = Vec::new();
                collect_mut(&mut state.dom, &selector, &mut found);
                for e in found {
                    e.attached = false;
                }
            }
            Mutation::Show(selector) => {
                let mut state = self.state.lock();
                let mut found = Vec::new();
                collect_mut(&mut state.dom, &selector, &mut found);
                for e in found {
                    e.visible = true;
                }
            }
            Mutation::Enable(selector) => {
                let mut state = self.state.lock();
                let mut found = Vec::new();
                collect_mut(&mut state.dom, &selector, &mut found);
                for e in found {
                    e.enabled = true;
                }
            }
            Mutation::MoveTo(selector, x, y) => {
                let mut state = self.state.lock();
                let mut found = Vec::new();
                collect_mut(&mut state.dom, &selector, &mut found);
                for e in found {
                    if let Some(b) = e.bbox.as_mut() {
                        b.x = x;
                        b.y = y;
                    }
                }
            }
            Mutation::Replace(selector, spec) => {
                let live = LiveElem::instantiate(&self.world, &spec);
                let mut state = self.state.lock();
                let mut found = Vec::new();
                collect_mut(&mut state.dom, &selector, &mut found);
                for e in found {
                    e.attached = false;
                }
                state.dom.push(live);
            }
            Mutation::Console(kind, text) => {
                self.emit(PageEvent::Console(ConsoleMessage { kind, text }));
            }
        }
    }

    fn run_click_effect(&self, effect: ClickEffect) -> DriverResult<()> {
        match effect {
            ClickEffect::OpenPopup(url) => {
                let spec = self
                    .world
                    .lookup(&url)
                    .ok_or_else(|| DriverError::NavigationFailed {
                        url: url.clone(),
                        reason: "no such route".to_string(),
                    })?;
                let popup = SimPage::blank(Arc::clone(&self.world), self.context.clone());
                popup.load_route(&url, &spec);
                let page: Arc<dyn PageDriver> = popup;
                self.emit(PageEvent::Opened { page, url });
            }
            ClickEffect::Navigate(url) => {
                let spec = self
                    .world
                    .lookup(&url)
                    .ok_or_else(|| DriverError::NavigationFailed {
                        url: url.clone(),
                        reason: "no such route".to_string(),
                    })?;
                self.load_route(&url, &spec);
            }
            ClickEffect::SetStorage(key, value) => {
                if let Some(ctx) = self.context.upgrade() {
                    let mut storage = ctx.storage.lock();
                    if !storage.is_object() {
                        *storage = serde_json::json!({});
                    }
                    storage[key] = value;
                }
            }
            ClickEffect::RaiseDialog(kind, message) => {
                self.emit(PageEvent::Dialog(DialogInfo { kind, message }));
            }
            ClickEffect::EmitConsole(kind, text) => {
                self.emit(PageEvent::Console(ConsoleMessage { kind, text }));
            }
        }
        Ok(())
    }
}

impl PageDriver for SimPage {
    fn query(&self, selector: &str) -> DriverResult<Vec<RawElement>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::TargetClosed("page".to_string()));
        }
        let state = self.state.lock();
        let mut found = Vec::new();
        collect(&state.dom, selector, &mut found);
        Ok(found.into_iter().filter(|e| e.attached).map(|e| e.snapshot()).collect())
    }

    fn query_within(&self, scope: &RawElement, selector: &str) -> DriverResult<Vec<RawElement>> {
        let state = self.state.lock();
        let Some(scope) = find_by_id(&state.dom, scope.node_id) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        collect(&scope.children, selector, &mut found);
        Ok(found.into_iter().filter(|e| e.attached).map(|e| e.snapshot()).collect())
    }

    fn act(&self, target: &RawElement, action: &Action) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::TargetClosed("page".to_string()));
        }
        let effect = {
            let mut state = self.state.lock();
            let Some(live) = find_by_id_mut(&mut state.dom, target.node_id).filter(|e| e.attached)
            else {
                return Err(DriverError::Detached);
            };
            match action {
                Action::Click => {}
                Action::Fill { value } => live.value = Some(value.clone()),
                Action::SetChecked { checked } => {
                    live.value = Some(if *checked { "checked" } else { "unchecked" }.to_string());
                }
                Action::Press { key } => {
                    let prior = live.value.clone().unwrap_or_default();
                    live.value = Some(format!("{prior}+{key}"));
                }
                Action::SelectOption { value } => live.value = Some(value.clone()),
            }
            let node_id = live.node_id;
            let effect = if matches!(action, Action::Click) {
                live.on_click.clone()
            } else {
                None
            };
            self.actions.lock().push((node_id, action.name().to_string()));
            effect
        };
        if let Some(effect) = effect {
            self.run_click_effect(effect)?;
        }
        Ok(())
    }

    fn navigate(&self, url: &str) -> DriverResult<NavigationOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::TargetClosed("page".to_string()));
        }
        let spec = self
            .world
            .lookup(url)
            .ok_or_else(|| DriverError::NavigationFailed {
                url: url.to_string(),
                reason: "no such route".to_string(),
            })?;
        self.load_route(url, &spec);
        Ok(NavigationOutcome {
            url: url.to_string(),
            status: spec.status,
            status_text: spec.status_text.clone(),
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) && !self.world.quiet_close.load(Ordering::SeqCst) {
            self.emit(PageEvent::Closed);
        }
    }

    fn subscribe(&self, sink: EventSink) {
        self.sinks.lock().push(sink);
    }
}
