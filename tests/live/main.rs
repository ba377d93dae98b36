//! End-to-end tests against a real browser.
//!
//! These need a Chromium-family browser listening on its debug port:
//!
//! ```sh
//! chromium --headless --remote-debugging-port=9222 about:blank
//! DUALPAGE_TEST_BROWSER=127.0.0.1:9222 cargo test --test live
//! ```
//!
//! Every test skips silently when no browser is reachable.

use std::time::Duration;

use dualpage::cdp::discovery;
use dualpage::{Config, DualPage, LiveResult, Mode, RequestOpts, SelectList, Tab};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

static INIT: std::sync::Once = std::sync::Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn test_host() -> String {
    std::env::var("DUALPAGE_TEST_BROWSER").unwrap_or_else(|_| "127.0.0.1:9222".to_string())
}

async fn connect_tab() -> Option<Tab> {
    init_logging();
    let host = test_host();
    if !discovery::is_browser_alive(&host).await {
        eprintln!("Skipping test: no browser at {host}");
        return None;
    }
    // A private tab per test keeps them independent.
    let main = Tab::connect(&host, None, Config::default()).await.ok()?;
    main.new_tab(Some("about:blank"), false).await.ok()
}

fn data_url(html: &str) -> String {
    format!("data:text/html,{}", urlencode(html))
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

async fn serve_forever(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nSet-Cookie: bridged=1; Path=/\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn navigate_and_query() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><head><title>T</title></head>
           <body><h1 id="head" class="big">Hello</h1><p>one</p><p>two</p></body></html>"#,
    );
    assert!(tab.get(&url, &RequestOpts::default()).await.unwrap());
    assert_eq!(tab.title().await.unwrap(), "T");

    let h1 = tab.ele("#head").await.unwrap().into_element().unwrap();
    assert_eq!(h1.tag().await.unwrap(), "h1");
    assert_eq!(h1.text().await.unwrap(), "Hello");
    assert_eq!(h1.attrs().await.unwrap().get("class").unwrap(), "big");

    let paragraphs = tab.eles("tag:p").await.unwrap();
    assert_eq!(paragraphs.len(), 2);

    // Identity invariant: describeNode round-trips to the same backend id.
    let backend = h1.backend_id().await.unwrap();
    let again = tab.ele("#head").await.unwrap().into_element().unwrap();
    assert_eq!(again.backend_id().await.unwrap(), backend);

    tab.close().await.unwrap();
}

#[tokio::test]
async fn covered_element_falls_back_to_js_click() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body>
             <button id="btn" onclick="document.title='clicked'">hit me</button>
             <div style="position:fixed;left:0;top:0;width:100vw;height:100vh;background:#fff8;"></div>
           </body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let button = tab.ele("#btn").await.unwrap().into_element().unwrap();
    assert!(button.is_covered().await.unwrap());

    // by_js = None: coverage triggers the JS fallback and still lands.
    button.click(None).await.unwrap();
    assert!(tab.wait_title_contains("clicked", Duration::from_secs(5)).await);

    // by_js = Some(false): the fallback is forbidden.
    let err = button.click(Some(false)).await.unwrap_err();
    assert!(matches!(err, dualpage::DualError::CannotClick(_)));

    tab.close().await.unwrap();
}

#[tokio::test]
async fn keyboard_input_and_clear() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(r#"<html><body><input id="box" type="text"></body></html>"#);
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let input = tab.ele("#box").await.unwrap().into_element().unwrap();
    input.input("hello", false).await.unwrap();
    assert_eq!(input.prop("value").await.unwrap(), "hello");

    // clear = true wipes the old content first.
    input.input("fresh", true).await.unwrap();
    assert_eq!(input.prop("value").await.unwrap(), "fresh");

    tab.close().await.unwrap();
}

#[tokio::test]
async fn trailing_newline_sends_enter() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body>
             <input id="box" onkeydown="if(event.key==='Enter')document.title='entered'">
           </body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let input = tab.ele("#box").await.unwrap().into_element().unwrap();
    input.input("abc\n", false).await.unwrap();
    assert!(tab.wait_title_contains("entered", Duration::from_secs(5)).await);

    tab.close().await.unwrap();
}

#[tokio::test]
async fn alert_is_latched_and_answered() {
    let Some(tab) = connect_tab().await else { return };
    tab.get(&data_url("<html><body>x</body></html>"), &RequestOpts::default())
        .await
        .unwrap();

    tab.run_js("setTimeout(() => confirm('proceed?'), 0); null")
        .await
        .unwrap();
    let text = tab
        .handle_alert(true, None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("proceed?"));
    assert_eq!(tab.alert_state().kind, dualpage::DialogKind::Confirm);
    assert!(!tab.alert_state().active);

    // No dialog pending: None, not an error.
    let none = tab
        .handle_alert(true, None, Duration::from_millis(200))
        .await
        .unwrap();
    assert!(none.is_none());

    tab.close().await.unwrap();
}

#[tokio::test]
async fn select_list_selection() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body>
             <select id="s">
               <option value="a">Alpha</option>
               <option value="b">Beta</option>
             </select>
           </body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let element = tab.ele("#s").await.unwrap().into_element().unwrap();
    let select = SelectList::from(element).await.unwrap();
    assert!(!select.is_multi().await.unwrap());
    assert_eq!(select.options().await.unwrap().len(), 2);

    assert!(select
        .select_by_value("b", Duration::from_secs(2))
        .await
        .unwrap());
    let picked = select.selected_option().await.unwrap().unwrap();
    assert_eq!(picked.text().await.unwrap(), "Beta");

    tab.close().await.unwrap();
}

#[tokio::test]
async fn history_walk_and_reload() {
    let Some(tab) = connect_tab().await else { return };
    let first = data_url("<html><body>first</body></html>");
    let second = data_url("<html><body>second</body></html>");
    tab.get(&first, &RequestOpts::default()).await.unwrap();
    tab.get(&second, &RequestOpts::default()).await.unwrap();

    assert!(tab.back(1).await.unwrap());
    assert!(tab.wait_url_contains("first", Duration::from_secs(5)).await);
    assert!(tab.forward(1).await.unwrap());
    assert!(tab.wait_url_contains("second", Duration::from_secs(5)).await);
    assert!(tab.reload().await.unwrap());

    tab.close().await.unwrap();
}

#[tokio::test]
async fn mode_switch_bridges_cookies_and_navigates() {
    init_logging();
    let host = test_host();
    if !discovery::is_browser_alive(&host).await {
        eprintln!("Skipping test: no browser at {host}");
        return;
    }
    let base = serve_forever("<html><head><title>bridge</title></head><body>b</body></html>").await;

    let mut page = DualPage::new_static(&host, Config::default());
    assert!(page.get(&base, &RequestOpts::default()).await.unwrap());
    assert!(page.cookies().await.unwrap().iter().any(|c| c.name == "bridged"));

    // Static → live: browser tab materializes, cookies for this origin
    // cross over, and the logical URL is re-loaded in the browser.
    page.change_mode(Mode::Live, true, true).await.unwrap();
    assert_eq!(page.mode(), Mode::Live);
    assert!(page
        .tab()
        .expect("tab materialized")
        .wait_url_contains(&base, Duration::from_secs(10))
        .await);
    assert!(page.cookies().await.unwrap().iter().any(|c| c.name == "bridged"));

    let _ = page.tab().expect("tab materialized").close().await;
}

#[tokio::test]
async fn element_screenshot_produces_png() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body><div id="box" style="width:80px;height:40px;background:#09c"></div></body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let element = tab.ele("#box").await.unwrap().into_element().unwrap();
    let png = element.screenshot().await.unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    let page_png = tab.screenshot(true).await.unwrap();
    assert_eq!(&page_png[..8], b"\x89PNG\r\n\x1a\n");

    tab.close().await.unwrap();
}

#[tokio::test]
async fn same_origin_iframe_queries() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body>
             <iframe id="inner" srcdoc="<p id='deep'>inside</p>"></iframe>
           </body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let frame = tab.get_frame("#inner").await.unwrap();
    assert!(frame.is_same_origin().await.unwrap());

    let deep = frame.ele("#deep").await.unwrap().into_element().unwrap();
    assert_eq!(deep.text().await.unwrap(), "inside");
    assert!(frame.html().await.unwrap().contains("deep"));

    tab.close().await.unwrap();
}

#[tokio::test]
async fn live_relatives_walk_siblings() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body><ul>
             <li id="a">A</li><li id="b">B</li><li id="c">C</li>
           </ul></body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let b = tab.ele("#b").await.unwrap().into_element().unwrap();
    let next = b.next(1).await.unwrap().unwrap();
    assert_eq!(next.attr("id").await.unwrap().as_deref(), Some("c"));
    let prev = b.prev(1).await.unwrap().unwrap();
    assert_eq!(prev.attr("id").await.unwrap().as_deref(), Some("a"));
    assert!(b.next(5).await.unwrap().is_none());

    let list = b.parent(1).await.unwrap().unwrap();
    assert_eq!(list.children().await.unwrap().len(), 3);

    tab.close().await.unwrap();
}

#[tokio::test]
async fn checkbox_and_storage() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(r#"<html><body><input id="cb" type="checkbox"></body></html>"#);
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let checkbox = tab.ele("#cb").await.unwrap().into_element().unwrap();
    assert!(!checkbox.is_selected().await.unwrap());
    checkbox.check(true).await.unwrap();
    assert!(checkbox.is_selected().await.unwrap());
    checkbox.check(false).await.unwrap();
    assert!(!checkbox.is_selected().await.unwrap());

    // data: pages have no storage access; just exercise the JS path
    // and accept the security error.
    let _ = tab.set_session_storage("k", Some("v")).await;

    tab.close().await.unwrap();
}

#[tokio::test]
async fn drag_moves_through_a_path() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body>
             <div id="src" style="width:40px;height:40px;background:#c00"></div>
             <script>
               window.moves = 0;
               addEventListener('mousemove', () => window.moves++);
             </script>
           </body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let source = tab.ele("#src").await.unwrap().into_element().unwrap();
    source
        .drag_to_point((200.0, 150.0), Duration::from_millis(200))
        .await
        .unwrap();
    let moves = tab.run_js("window.moves").await.unwrap();
    assert!(moves.as_f64().unwrap_or(0.0) >= 2.0, "moves = {moves}");

    tab.close().await.unwrap();
}

#[tokio::test]
async fn page_geometry_and_scroll() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(
        r#"<html><body style="height:3000px"><p id="tail" style="margin-top:2500px">end</p></body></html>"#,
    );
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let (_, page_h) = tab.page_size().await.unwrap();
    assert!(page_h >= 2500.0, "page height {page_h}");
    let (vw, vh) = tab.viewport_size().await.unwrap();
    assert!(vw > 0.0 && vh > 0.0);

    tab.scroll_to_bottom().await.unwrap();
    let (_, y) = tab.scroll_position().await.unwrap();
    assert!(y > 0.0);
    tab.scroll_to_top().await.unwrap();
    let (_, y) = tab.scroll_position().await.unwrap();
    assert_eq!(y, 0.0);

    tab.scroll_to_see("#tail").await.unwrap();
    let tail = tab.ele("#tail").await.unwrap().into_element().unwrap();
    assert!(tail.is_in_viewport().await.unwrap());

    tab.close().await.unwrap();
}

#[tokio::test]
async fn active_element_follows_focus() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url(r#"<html><body><input id="one"><input id="two"></body></html>"#);
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let two = tab.ele("#two").await.unwrap().into_element().unwrap();
    two.focus().await.unwrap();
    let active = tab.active_ele().await.unwrap();
    assert_eq!(active.attr("id").await.unwrap().as_deref(), Some("two"));

    tab.close().await.unwrap();
}

#[tokio::test]
async fn xpath_queries_return_primitives_live() {
    let Some(tab) = connect_tab().await else { return };
    let url = data_url("<html><body><p>a</p><p>b</p></body></html>");
    tab.get(&url, &RequestOpts::default()).await.unwrap();

    let root = tab.ele("tag:body").await.unwrap().into_element().unwrap();
    let count = root.ele("x:count(.//p)").await.unwrap();
    assert!(matches!(count, LiveResult::Num(n) if n == 2.0));

    let text = root.ele("x:.//p/text()").await.unwrap();
    assert!(matches!(text, LiveResult::Str(s) if s == "a"));

    tab.close().await.unwrap();
}
