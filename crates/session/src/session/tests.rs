use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qix_rpc::{MemoryPeer, MemoryServer, memory};
use serde_json::json;

use super::*;
use crate::api::{Doc, GenericObject};
use crate::init_tracing;
use crate::object::ForTypes;
use crate::schema::{MethodDef, Params};

const URL: &str = "ws://engine.test/app/engineData";

fn session_with(config: SessionConfig) -> (Session, MemoryServer) {
	init_tracing();
	let (connector, server) = memory();
	let session = Session::builder(config).connector(connector).build().unwrap();
	(session, server)
}

fn record(session: &Session) -> (Subscription, Arc<Mutex<Vec<SessionEvent>>>) {
	let events = Arc::new(Mutex::new(Vec::new()));
	let sub = session.on({
		let events = events.clone();
		move |event| {
			if !matches!(event, SessionEvent::Traffic { .. }) {
				events.lock().push(event.clone());
			}
		}
	});
	(sub, events)
}

fn record_object(object: &RemoteObject) -> Arc<Mutex<Vec<ObjectEvent>>> {
	let events = Arc::new(Mutex::new(Vec::new()));
	object
		.on({
			let events = events.clone();
			move |event| {
				if !matches!(event, ObjectEvent::Traffic { .. }) {
					events.lock().push(event.clone());
				}
			}
		})
		.detach();
	events
}

async fn answer(peer: &mut MemoryPeer, method: &str, result: JsonValue) -> JsonValue {
	let request = peer.recv().await.expect("request");
	assert_eq!(request["method"], method);
	peer.reply(&request, result);
	request
}

async fn answer_delta(peer: &mut MemoryPeer, method: &str, result: JsonValue) -> JsonValue {
	let request = peer.recv().await.expect("request");
	assert_eq!(request["method"], method);
	peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "delta": true, "result": result}));
	request
}

fn reference(handle: i64, kind: &str, id: &str) -> JsonValue {
	json!({"qReturn": {"qHandle": handle, "qType": kind, "qGenericId": id}})
}

async fn opened(config: SessionConfig) -> (Session, Global, MemoryPeer) {
	let (session, mut server) = session_with(config);
	let global = session.open().await.unwrap();
	let peer = server.accept().await.unwrap();
	(session, global, peer)
}

async fn open_doc(global: &Global, peer: &mut MemoryPeer) -> Doc {
	let (doc, _) = tokio::join!(global.open_doc("sales.qvf"), answer(peer, "OpenDoc", reference(1, "Doc", "sales.qvf")));
	doc.unwrap()
}

async fn create_object(doc: &Doc, peer: &mut MemoryPeer, handle: i64, id: &str) -> GenericObject {
	let (object, _) = tokio::join!(
		doc.create_object(json!({"qInfo": {"qId": id, "qType": "table"}})),
		answer(peer, "CreateObject", reference(handle, "GenericObject", id))
	);
	object.unwrap()
}

#[tokio::test]
async fn open_creates_global_and_is_shared() {
	let (session, mut server) = session_with(SessionConfig::new(URL));
	let (_sub, events) = record(&session);
	assert_eq!(session.state(), SessionState::Unopened);

	let (first, second) = tokio::join!(session.open(), session.open());
	let (first, second) = (first.unwrap(), second.unwrap());
	assert!(first.ptr_eq(&second));
	assert_eq!(first.handle(), Handle::GLOBAL);
	assert_eq!(first.id(), "Global");
	assert_eq!(first.generic_type(), Some("Global"));
	assert_eq!(session.state(), SessionState::Opened);
	assert_eq!(*events.lock(), vec![SessionEvent::Opened]);
	assert!(server.accept().await.is_some());
}

#[tokio::test]
async fn create_object_and_rebuild_delta_layouts() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	assert_eq!(doc.handle(), Handle(1));

	let (object, request) = tokio::join!(
		doc.create_object(json!({"qInfo": {"qType": "table"}})),
		answer(&mut peer, "CreateObject", reference(7, "GenericObject", "obj1"))
	);
	let object = object.unwrap();
	assert_eq!(request["handle"], 1);
	assert_eq!(request["params"], json!([{"qInfo": {"qType": "table"}}]));
	assert_eq!(object.handle(), Handle(7));
	assert_eq!(object.id(), "obj1");

	let (layout, request) = tokio::join!(
		object.get_layout(),
		answer_delta(&mut peer, "GetLayout", json!({"qLayout": [{"op": "add", "path": "/title", "value": "Q1"}]}))
	);
	assert_eq!(request["delta"], true);
	assert_eq!(request["handle"], 7);
	assert_eq!(layout.unwrap(), json!({"title": "Q1"}));

	let (layout, _) = tokio::join!(
		object.get_layout(),
		answer_delta(&mut peer, "GetLayout", json!({"qLayout": [{"op": "replace", "path": "/title", "value": "Q2"}]}))
	);
	assert_eq!(layout.unwrap(), json!({"title": "Q2"}));
}

#[tokio::test]
async fn delta_is_not_requested_when_disabled_or_ineligible() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let (destroyed, request) = tokio::join!(doc.destroy_object("obj1"), answer(&mut peer, "DestroyObject", json!({"qSuccess": true})));
	assert!(destroyed.unwrap());
	assert!(request.get("delta").is_none());

	let (_session, global, mut peer) = opened(SessionConfig::new(URL).delta(false)).await;
	let (version, request) = tokio::join!(
		global.engine_version(),
		answer(&mut peer, "EngineVersion", json!({"qVersion": {"qComponentVersion": "12.20.0"}}))
	);
	assert_eq!(version.unwrap(), "12.20.0");
	assert!(request.get("delta").is_none());
}

#[tokio::test]
async fn delta_result_must_be_patches() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let (version, _) = tokio::join!(
		global.engine_version(),
		answer_delta(&mut peer, "EngineVersion", json!({"qVersion": {"qComponentVersion": "12.20.0"}}))
	);
	assert_eq!(version.unwrap_err(), Error::ExpectedArrayOfPatches("qVersion".into()));
}

#[tokio::test]
async fn concurrent_calls_resolve_by_id() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL).delta(false)).await;
	let doc = open_doc(&global, &mut peer).await;
	let a = create_object(&doc, &mut peer, 2, "a").await;
	let b = create_object(&doc, &mut peer, 3, "b").await;

	let engine = async {
		let first = peer.recv().await.unwrap();
		let second = peer.recv().await.unwrap();
		for request in [&second, &first] {
			peer.reply(request, json!({"qLayout": {"handle": request["handle"]}}));
		}
	};
	let (la, lb, ()) = tokio::join!(a.get_layout(), b.get_layout(), engine);
	assert_eq!(la.unwrap(), json!({"handle": 2}));
	assert_eq!(lb.unwrap(), json!({"handle": 3}));
}

#[tokio::test]
async fn remote_errors_and_missing_objects() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;

	let engine = async {
		let request = peer.recv().await.unwrap();
		peer.reply_error(&request, 1004, "Invalid handle");
	};
	let (layout, ()) = tokio::join!(doc.get_app_layout(), engine);
	let Error::Remote(remote) = layout.unwrap_err() else {
		panic!("expected a remote error");
	};
	assert_eq!(remote.code, 1004);
	assert_eq!(remote.message, "Invalid handle");

	let (missing, _) = tokio::join!(
		doc.get_object("nope"),
		answer(&mut peer, "GetObject", json!({"qReturn": {"qHandle": null, "qType": null}}))
	);
	assert_eq!(missing.unwrap_err(), Error::ObjectNotFound);
}

#[tokio::test]
async fn unknown_type_is_rejected() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let (object, _) = tokio::join!(doc.get_object("x"), answer(&mut peer, "GetObject", reference(9, "Mystery", "x")));
	assert_eq!(object.unwrap_err(), Error::SchemaStructTypeNotFound("Mystery".into()));
}

#[tokio::test]
async fn named_params_are_laid_out_by_schema() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let object = create_object(&doc, &mut peer, 2, "a").await;

	let call = object.call(
		"selectHyperCubeValues",
		Params::named([("qPath", json!("/qHyperCubeDef")), ("qValues", json!([0]))]),
	);
	let (selected, request) = tokio::join!(call, answer(&mut peer, "SelectHyperCubeValues", json!({"qSuccess": true})));
	assert_eq!(selected.unwrap().into_value().unwrap(), json!(true));
	assert_eq!(request["params"], json!(["/qHyperCubeDef", 0, [0], false]));
}

#[tokio::test]
async fn session_app_id_comes_from_the_out_param() {
	let (_session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let (doc, _) = tokio::join!(
		global.create_session_app(),
		answer(
			&mut peer,
			"CreateSessionApp",
			json!({"qReturn": {"qHandle": 1, "qType": "Doc", "qGenericId": ""}, "qSessionAppId": "SessionApp_9"})
		)
	);
	assert_eq!(doc.unwrap().id(), "SessionApp_9");
}

#[tokio::test]
async fn pushes_fan_out_to_objects() {
	let (session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let a = create_object(&doc, &mut peer, 2, "a").await;
	let b = create_object(&doc, &mut peer, 3, "b").await;
	let (a_events, b_events) = (record_object(&a), record_object(&b));

	let engine = async {
		let request = peer.recv().await.unwrap();
		peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": {"qLayout": {}}, "change": [2], "close": [3]}));
	};
	let (layout, ()) = tokio::join!(a.get_layout(), engine);
	layout.unwrap();

	assert_eq!(*a_events.lock(), vec![ObjectEvent::Changed]);
	assert_eq!(*b_events.lock(), vec![ObjectEvent::Closed]);
	assert!(session.object(Handle(3)).is_none());
	assert!(session.object(Handle(2)).is_some());
}

#[tokio::test]
async fn notifications_and_traffic_are_reemitted() {
	let (session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let (_sub, events) = record(&session);
	let traffic = Arc::new(AtomicUsize::new(0));
	global
		.on({
			let traffic = traffic.clone();
			move |event| {
				if matches!(event, ObjectEvent::Traffic { .. }) {
					traffic.fetch_add(1, Ordering::SeqCst);
				}
			}
		})
		.detach();

	let (user, _) = tokio::join!(global.get_authenticated_user(), answer(&mut peer, "GetAuthenticatedUser", json!({"qReturn": "sa"})));
	assert_eq!(user.unwrap(), "sa");
	assert_eq!(traffic.load(Ordering::SeqCst), 2);

	peer.notify("OnMaxParallelSessionsExceeded", json!({"qMessage": "busy"}));
	let (_, ()) = tokio::join!(global.get_doc_list(), async {
		answer(&mut peer, "GetDocList", json!({"qDocList": []})).await;
	});
	assert_eq!(
		*events.lock(),
		vec![SessionEvent::Notification(Notification {
			method: "OnMaxParallelSessionsExceeded".into(),
			params: json!({"qMessage": "busy"}),
		})]
	);
}

#[tokio::test]
async fn suspended_session_writes_nothing() {
	let (session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let (_sub, events) = record(&session);
	let doc = open_doc(&global, &mut peer).await;

	let pending = tokio::spawn({
		let doc = doc.clone();
		async move { doc.get_app_layout().await }
	});
	peer.recv().await.unwrap();

	session.suspend().await.unwrap();
	assert_eq!(session.state(), SessionState::Suspended);
	assert!(matches!(pending.await.unwrap(), Err(Error::NotConnected(_))));

	let call = session.send(Request::new("GetAppLayout", doc.handle(), json!([])));
	assert_eq!(call.await.unwrap_err(), Error::SessionSuspended);
	assert_eq!(doc.get_app_layout().await.unwrap_err(), Error::SessionSuspended);
	assert!(peer.try_recv().is_none());
	assert!(!doc.is_closed());

	assert_eq!(
		*events.lock(),
		vec![SessionEvent::Suspended {
			initiator: Initiator::Manual,
			code: CLOSE_MANUAL_SUSPEND,
			reason: String::new(),
		}]
	);
}

#[tokio::test]
async fn resume_rebinds_and_closes_objects() {
	let (session, mut server) = session_with(SessionConfig::new(URL));
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();
	let doc = open_doc(&global, &mut peer).await;
	let a = create_object(&doc, &mut peer, 2, "a").await;
	let b = create_object(&doc, &mut peer, 3, "b").await;
	let (variable, _) = tokio::join!(doc.get_variable_by_id("v"), answer(&mut peer, "GetVariableById", reference(4, "GenericVariable", "v")));
	let variable = variable.unwrap();

	let (global_events, doc_events) = (record_object(&global), record_object(&doc));
	let (a_events, b_events, v_events) = (record_object(&a), record_object(&b), record_object(&variable));
	let (_sub, events) = record(&session);

	session.suspend().await.unwrap();

	let engine = async {
		let mut peer = server.accept().await.unwrap();
		peer.notify("OnConnected", json!({"qSessionState": "SESSION_ATTACHED"}));
		answer(&mut peer, "GetActiveDoc", reference(11, "Doc", "sales.qvf")).await;
		for _ in 0..3 {
			let request = peer.recv().await.unwrap();
			assert_eq!(request["handle"], 11);
			match (request["method"].as_str().unwrap(), request["params"][0].as_str().unwrap()) {
				("GetObject", "a") => peer.reply(&request, json!({"qReturn": {"qHandle": 12, "qType": "GenericObject"}})),
				("GetObject", "b") => peer.reply_error(&request, 2, "Object not found"),
				("GetVariableById", "v") => peer.reply(&request, json!({"qReturn": {"qHandle": 14, "qType": "GenericVariable"}})),
				other => panic!("unexpected lookup {other:?}"),
			}
		}
		peer
	};
	let (resumed, _peer) = tokio::join!(session.resume(false), engine);
	assert_eq!(resumed.unwrap(), AttachState::Attached);
	assert_eq!(session.state(), SessionState::Opened);

	assert_eq!(
		session.objects().iter().map(|o| o.handle().0).collect::<Vec<_>>(),
		vec![-1, 11, 12, 14]
	);
	assert_eq!((doc.handle(), a.handle(), variable.handle()), (Handle(11), Handle(12), Handle(14)));
	assert!(b.is_closed());

	assert!(global_events.lock().is_empty());
	assert_eq!(*doc_events.lock(), vec![ObjectEvent::Changed]);
	assert_eq!(*a_events.lock(), vec![ObjectEvent::Changed]);
	assert_eq!(*v_events.lock(), vec![ObjectEvent::Changed]);
	assert_eq!(*b_events.lock(), vec![ObjectEvent::Closed]);
	assert_eq!(events.lock().last(), Some(&SessionEvent::Resumed));
}

#[tokio::test]
async fn resume_replays_open_doc_when_no_doc_is_active() {
	let (session, mut server) = session_with(SessionConfig::new(URL));
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();
	let (doc, request) = tokio::join!(
		global.open_doc_with(Params::named([("qDocName", json!("sales.qvf")), ("qNoData", json!(true))])),
		answer(&mut peer, "OpenDoc", reference(1, "Doc", "sales.qvf"))
	);
	let doc = doc.unwrap();
	assert_eq!(request["params"], json!(["sales.qvf", "", "", "", true]));

	session.suspend().await.unwrap();
	let engine = async {
		let mut peer = server.accept().await.unwrap();
		peer.notify("OnConnected", json!({"qSessionState": "SESSION_CREATED"}));
		let active = peer.recv().await.unwrap();
		assert_eq!(active["method"], "GetActiveDoc");
		peer.reply_error(&active, 1007, "No active document");
		let replay = answer(&mut peer, "OpenDoc", reference(21, "Doc", "sales.qvf")).await;
		assert_eq!(replay["params"], json!(["sales.qvf", "", "", "", true]));
		peer
	};
	let (resumed, _peer) = tokio::join!(session.resume(false), engine);
	assert_eq!(resumed.unwrap(), AttachState::Created);
	assert_eq!(doc.handle(), Handle(21));
	assert!(!doc.is_closed());
}

#[tokio::test]
async fn resume_without_doc_closes_doc_objects() {
	let (session, mut server) = session_with(SessionConfig::new(URL));
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();
	let doc = open_doc(&global, &mut peer).await;
	let object = create_object(&doc, &mut peer, 2, "a").await;
	let object_events = record_object(&object);

	session.suspend().await.unwrap();
	let engine = async {
		let mut peer = server.accept().await.unwrap();
		peer.notify("OnConnected", json!({"qSessionState": "SESSION_ATTACHED"}));
		let active = peer.recv().await.unwrap();
		peer.reply_error(&active, 1007, "No active document");
		let replay = peer.recv().await.unwrap();
		assert_eq!(replay["method"], "OpenDoc");
		peer.reply_error(&replay, 1002, "App already open");
		peer
	};
	let (resumed, _peer) = tokio::join!(session.resume(false), engine);
	resumed.unwrap();
	assert!(doc.is_closed());
	assert!(object.is_closed());
	assert_eq!(*object_events.lock(), vec![ObjectEvent::Closed]);
	assert_eq!(session.objects().len(), 1);
}

#[tokio::test]
async fn failed_resume_keeps_objects_untouched() {
	let (session, mut server) = session_with(SessionConfig::new(URL));
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();
	let doc = open_doc(&global, &mut peer).await;
	let object = create_object(&doc, &mut peer, 2, "a").await;
	let (doc_events, object_events) = (record_object(&doc), record_object(&object));

	session.suspend().await.unwrap();
	let (_sub, events) = record(&session);
	let engine = async {
		let mut peer = server.accept().await.unwrap();
		peer.notify("OnConnected", json!({"qSessionState": "SESSION_ATTACHED"}));
		answer(&mut peer, "GetActiveDoc", reference(11, "Doc", "sales.qvf")).await;
		let lookup = peer.recv().await.unwrap();
		assert_eq!(lookup["method"], "GetObject");
		peer.close(1006, "lost");
		peer
	};
	let (resumed, _peer) = tokio::join!(session.resume(false), engine);

	assert!(matches!(resumed, Err(Error::NotConnected(_))));
	assert_eq!(session.state(), SessionState::Suspended);
	assert_eq!(session.transport().ready_state(), qix_rpc::ReadyState::Closed);
	assert_eq!(
		session.objects().iter().map(|o| o.handle().0).collect::<Vec<_>>(),
		vec![-1, 1, 2]
	);
	assert_eq!((doc.handle(), object.handle()), (Handle(1), Handle(2)));
	assert!(!doc.is_closed() && !object.is_closed());
	assert!(doc_events.lock().is_empty());
	assert!(object_events.lock().is_empty());
	assert!(events.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn resume_only_if_attached_fails_on_new_session() {
	let (session, _server) = session_with(SessionConfig::new(URL));
	let global = session.open().await.unwrap();
	session.suspend().await.unwrap();

	assert_eq!(session.resume(true).await.unwrap_err(), Error::SessionNotAttached);
	assert_eq!(session.state(), SessionState::Suspended);
	assert_eq!(session.transport().ready_state(), qix_rpc::ReadyState::Closed);
	assert!(!global.is_closed());
	assert_eq!(global.get_doc_list().await.unwrap_err(), Error::SessionSuspended);
}

fn lifecycle_events(session: &Session) -> (Subscription, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
	let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
	let sub = session.on(move |event| {
		if matches!(event, SessionEvent::Suspended { .. } | SessionEvent::Closed(_)) {
			let _ = tx.send(event.clone());
		}
	});
	(sub, rx)
}

#[tokio::test]
async fn network_close_suspends_when_configured() {
	let (session, global, peer) = opened(SessionConfig::new(URL).suspend_on_close(true)).await;
	let (_sub, mut events) = lifecycle_events(&session);

	peer.close(1006, "lost");
	assert_eq!(
		events.recv().await.unwrap(),
		SessionEvent::Suspended {
			initiator: Initiator::Network,
			code: 1006,
			reason: "lost".into(),
		}
	);
	assert_eq!(session.state(), SessionState::Suspended);
	assert!(!global.is_closed());
}

#[tokio::test]
async fn network_close_tears_down_otherwise() {
	let (session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let (_sub, mut events) = lifecycle_events(&session);

	peer.close(1006, "lost");
	assert_eq!(events.recv().await.unwrap(), SessionEvent::Closed(CloseEvent::new(1006, "lost")));
	assert_eq!(session.state(), SessionState::Closed);
	assert!(global.is_closed() && doc.is_closed());
	assert!(session.objects().is_empty());
	assert!(matches!(session.open().await, Err(Error::NotConnected(_))));
}

#[tokio::test]
async fn close_tears_down() {
	let (session, global, mut peer) = opened(SessionConfig::new(URL)).await;
	let doc = open_doc(&global, &mut peer).await;
	let doc_events = record_object(&doc);
	let (_sub, mut events) = lifecycle_events(&session);

	let closed = session.close().await;
	assert_eq!(closed, CloseEvent::new(CLOSE_NORMAL, ""));
	assert_eq!(events.recv().await.unwrap(), SessionEvent::Closed(closed));
	assert_eq!(*doc_events.lock(), vec![ObjectEvent::Closed]);
	assert!(session.objects().is_empty());
	assert!(matches!(session.suspend().await, Err(Error::NotConnected(_))));
	assert!(events.try_recv().is_err());
}

struct RetryBusy {
	retries: Arc<AtomicUsize>,
}

#[async_trait]
impl ResponseInterceptor for RetryBusy {
	async fn on_rejected(&self, call: &CallContext, error: Error) -> Result<Reply> {
		if error.code() == 1234 && self.retries.fetch_add(1, Ordering::SeqCst) == 0 {
			return call.retry().await;
		}
		Err(error)
	}
}

#[tokio::test]
async fn response_interceptor_may_retry() {
	let retries = Arc::new(AtomicUsize::new(0));
	let (connector, mut server) = memory();
	let session = Session::builder(SessionConfig::new(URL))
		.connector(connector)
		.response_interceptor(Position::Last, RetryBusy { retries: retries.clone() })
		.build()
		.unwrap();
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();

	let engine = async {
		let first = peer.recv().await.unwrap();
		peer.reply_error(&first, 1234, "Busy");
		let second = answer(&mut peer, "GetDocList", json!({"qDocList": [{"qDocName": "a"}]})).await;
		assert_ne!(first["id"], second["id"]);
	};
	let (list, ()) = tokio::join!(global.get_doc_list(), engine);
	assert_eq!(list.unwrap(), json!([{"qDocName": "a"}]));
	assert_eq!(retries.load(Ordering::SeqCst), 1);
}

struct Counting(Arc<AtomicUsize>);

struct CountingInvoke {
	inner: Arc<dyn Invoke>,
	calls: Arc<AtomicUsize>,
}

impl Layer<Arc<dyn Invoke>> for Counting {
	type Service = Arc<dyn Invoke>;

	fn layer(&self, inner: Arc<dyn Invoke>) -> Arc<dyn Invoke> {
		Arc::new(CountingInvoke {
			inner,
			calls: self.0.clone(),
		})
	}
}

#[async_trait]
impl Invoke for CountingInvoke {
	async fn invoke(&self, object: &RemoteObject, method: &MethodDef, params: JsonValue) -> Result<Reply> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.inner.invoke(object, method, params).await
	}
}

#[tokio::test]
async fn layers_wrap_matching_types_only() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (connector, mut server) = memory();
	let session = Session::builder(SessionConfig::new(URL).delta(false))
		.connector(connector)
		.layer(ForTypes::new(["GenericObject"], Counting(calls.clone())))
		.build()
		.unwrap();
	let global = session.open().await.unwrap();
	let mut peer = server.accept().await.unwrap();
	let doc = open_doc(&global, &mut peer).await;
	let object = create_object(&doc, &mut peer, 2, "a").await;

	let (layout, _) = tokio::join!(object.get_layout(), answer(&mut peer, "GetLayout", json!({"qLayout": {}})));
	layout.unwrap();
	let (layout, _) = tokio::join!(doc.get_app_layout(), answer(&mut peer, "GetAppLayout", json!({"qLayout": {}})));
	layout.unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
