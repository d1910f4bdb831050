//! Static parts of an exported bundle: the HTML entry point, the standalone
//! viewer script, its stylesheet and a README.
//!
//! The viewer script mirrors [`crate::runtime::Navigator`]: same states, same
//! "ignore navigation while transitioning" policy, same fade safety timeout
//! and the same one-shot autoplay retry. Styles and timing are inlined so the
//! viewer does not need a second fetch for them.

use crate::model::CustomStyles;
use crate::settings::ViewerTiming;

const STYLES_SLOT: &str = "__PANOTOUR_STYLES__";
const TIMING_SLOT: &str = "__PANOTOUR_TIMING__";
const TITLE_SLOT: &str = "__PANOTOUR_TITLE__";
const FALLBACK_SLOT: &str = "__PANOTOUR_BLANK__";

pub fn index_html(title: &str) -> String {
    INDEX_TEMPLATE.replace(TITLE_SLOT, &escape_html(title))
}

pub fn script_js(styles: &CustomStyles, timing: &ViewerTiming) -> Result<String, serde_json::Error> {
    Ok(SCRIPT_TEMPLATE
        .replace(STYLES_SLOT, &serde_json::to_string(styles)?)
        .replace(TIMING_SLOT, &serde_json::to_string(timing)?)
        .replace(FALLBACK_SLOT, crate::paths::BLANK_PANORAMA))
}

pub fn style_css(styles: &CustomStyles) -> String {
    STYLE_TEMPLATE
        .replace("__POPUP_BG__", &styles.popup.background_color)
        .replace("__POPUP_TEXT__", &styles.popup.text_color)
        .replace("__POPUP_BORDER__", &styles.popup.border_color)
        .replace("__FADE_COLOR__", &styles.transition.fade_color)
}

pub fn readme(title: &str, scene_count: usize, hotspot_count: usize) -> String {
    format!(
        "# {title}\n\n\
         Panoramic tour with {scene_count} scenes and {hotspot_count} hotspots.\n\n\
         ## Viewing\n\n\
         Serve this folder over HTTP and open `index.html`, for example:\n\n\
         ```sh\npython3 -m http.server 8000\n```\n\n\
         Browsers block `config.json` when `index.html` is opened straight from disk.\n\n\
         ## Layout\n\n\
         - `config.json`: scenes, hotspots and styles\n\
         - `images/`: panoramas\n\
         - `audio/`: hotspot and ambient audio\n\
         - `script.js`, `style.css`: the viewer\n"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>__PANOTOUR_TITLE__</title>
  <link rel="stylesheet" href="style.css">
  <script src="https://aframe.io/releases/1.5.0/aframe.min.js"></script>
</head>
<body>
  <a-scene id="tour" vr-mode-ui="enabled: true">
    <a-assets id="preloaded"></a-assets>
    <a-sky id="panorama" rotation="0 -90 0"></a-sky>
    <a-entity id="hotspots"></a-entity>
    <a-entity id="rig">
      <a-camera id="camera" look-controls="reverseMouseDrag: true">
        <a-cursor raycaster="objects: .clickable"></a-cursor>
      </a-camera>
    </a-entity>
  </a-scene>
  <div id="fade"></div>
  <div id="error" hidden><span id="error-text"></span><button id="error-close">×</button></div>
  <script src="script.js"></script>
</body>
</html>
"#;

const STYLE_TEMPLATE: &str = r"html, body { margin: 0; height: 100%; overflow: hidden; }
#fade {
  position: fixed; inset: 0; pointer-events: none;
  background: __FADE_COLOR__; opacity: 0; transition: opacity 0.5s ease;
  z-index: 10;
}
#fade.visible { opacity: 1; }
#error {
  position: fixed; left: 50%; bottom: 2rem; transform: translateX(-50%);
  padding: 0.75rem 1rem; border-radius: 6px; z-index: 20;
  background: __POPUP_BG__; color: __POPUP_TEXT__; border: 1px solid __POPUP_BORDER__;
  font-family: sans-serif;
}
#error button { margin-left: 1rem; background: none; border: none; color: inherit; cursor: pointer; }
";

const SCRIPT_TEMPLATE: &str = r##"(() => {
  "use strict";

  const STYLES = __PANOTOUR_STYLES__;
  const TIMING = __PANOTOUR_TIMING__;
  const BLANK = "__PANOTOUR_BLANK__";

  let project = null;
  let state = { kind: "uninitialized" };
  let ticket = 0;
  let pendingTicket = null;
  let ambient = null;
  let retryAmbient = null;
  const images = {};

  const $ = (id) => document.getElementById(id);

  function fallbackImage(sceneId) { return "./images/" + sceneId + ".jpg"; }

  function resolve(ref, sceneId) {
    if (typeof ref !== "string" || ref.trim() === "") return fallbackImage(sceneId);
    if (/^(https?:|data:)/i.test(ref)) return ref;
    return "./" + ref.replace(/^\.?\//, "");
  }

  function defaultProject() {
    return {
      name: "Untitled tour",
      currentScene: "scene_1",
      scenes: { scene_1: { name: "Scene 1", image: "", hotspots: [] } },
    };
  }

  async function loadConfig() {
    try {
      const res = await fetch("config.json");
      if (!res.ok) throw new Error("HTTP " + res.status);
      const doc = await res.json();
      if (!doc || typeof doc.scenes !== "object" || Object.keys(doc.scenes).length === 0) {
        throw new Error("no scenes");
      }
      return doc;
    } catch (e) {
      console.warn("config.json unavailable, using an empty tour:", e);
      return defaultProject();
    }
  }

  function preloadOne(sceneId, src) {
    return new Promise((resolveLoad) => {
      const img = new Image();
      img.crossOrigin = "anonymous";
      img.onload = () => resolveLoad(true);
      img.onerror = () => { console.warn("Preload failed for", sceneId, src); resolveLoad(false); };
      img.src = src;
    });
  }

  async function preloadAll() {
    const jobs = Object.keys(project.scenes).map((id) => preloadOne(id, images[id]));
    const budget = new Promise((r) => setTimeout(() => r("timeout"), TIMING.preloadBudgetMs));
    const result = await Promise.race([Promise.all(jobs), budget]);
    if (result === "timeout") console.warn("Preload budget exhausted; continuing");
  }

  function showFade() { $("fade").classList.add("visible"); }
  function hideFade() { $("fade").classList.remove("visible"); }

  function showError(sceneId, path) {
    $("error-text").textContent = "Could not load '" + path + "' for scene '" + sceneId + "'";
    $("error").hidden = false;
  }

  function stopAmbient() {
    if (ambient) { ambient.pause(); ambient.src = ""; ambient = null; }
    retryAmbient = null;
  }

  function playAmbient(sceneId, sound) {
    stopAmbient();
    if (!sound || !sound.enabled || !sound.audio) return;
    const audio = new Audio(resolve(sound.audio, sceneId));
    audio.loop = true;
    audio.volume = Math.min(1, Math.max(0, sound.volume ?? 0.5));
    ambient = audio;
    audio.play().catch(() => { retryAmbient = audio; });
  }

  function onUserInteraction() {
    if (retryAmbient && retryAmbient === ambient) {
      const audio = retryAmbient;
      retryAmbient = null;
      audio.play().catch((e) => console.warn("Ambient audio refused again:", e));
    }
  }

  function markerFor(type) {
    const key = type === "text-audio" ? "textAudio" : type;
    return (STYLES.hotspots && STYLES.hotspots[key]) || { color: "#FFFFFF", size: 0.6, opacity: 0.9 };
  }

  function renderHotspots(sceneId, scene) {
    const root = $("hotspots");
    while (root.firstChild) root.removeChild(root.firstChild);
    for (const h of scene.hotspots || []) {
      if (h.type === "navigation" && !project.scenes[h.navigationTarget]) continue;
      const p = h.position || { x: 0, y: 0, z: 0 };
      const style = markerFor(h.type);
      const el = document.createElement("a-sphere");
      el.classList.add("clickable");
      el.setAttribute("position", p.x + " " + p.y + " " + p.z);
      el.setAttribute("radius", style.size / 2);
      el.setAttribute("material", "color: " + style.color + "; opacity: " + style.opacity);
      el.addEventListener("click", () => activate(sceneId, h));
      root.appendChild(el);
    }
  }

  function closePopup() {
    const open = $("popup");
    if (open) open.parentNode.removeChild(open);
  }

  // Text panel sized by the hotspot's popupWidth/popupHeight, turned to face the camera.
  function showPopup(h) {
    closePopup();
    const ps = STYLES.popup || {};
    const w = h.popupWidth || 4;
    const ht = h.popupHeight || 2.5;
    const p = h.position || { x: 0, y: 0, z: 0 };
    const yaw = Math.atan2(-p.x, -p.z) * 180 / Math.PI;
    const popup = document.createElement("a-entity");
    popup.id = "popup";
    popup.setAttribute("position", p.x + " " + (p.y + ht / 2 + 0.5) + " " + p.z);
    popup.setAttribute("rotation", "0 " + yaw + " 0");
    const panel = document.createElement("a-plane");
    panel.classList.add("clickable");
    panel.setAttribute("width", w);
    panel.setAttribute("height", ht);
    panel.setAttribute("material", "side: double; color: " + (ps.backgroundColor || "#1A1A2E") +
      "; opacity: " + (ps.opacity ?? 0.9));
    panel.addEventListener("click", closePopup);
    const text = document.createElement("a-text");
    text.setAttribute("value", h.text);
    text.setAttribute("align", "center");
    text.setAttribute("color", ps.textColor || "#FFFFFF");
    text.setAttribute("width", Math.max(0.5, w - 2 * (ps.padding || 0)));
    text.setAttribute("position", "0 0 0.01");
    panel.appendChild(text);
    popup.appendChild(panel);
    $("hotspots").appendChild(popup);
  }

  function activate(sceneId, h) {
    onUserInteraction();
    if (h.type === "navigation") { navigateTo(h.navigationTarget); return; }
    if (h.audio) new Audio(resolve(h.audio, sceneId)).play().catch(() => {});
    if (h.text) showPopup(h);
  }

  // Scene image, then ./images/<id>.jpg, then a blank panorama. Each failure
  // shows a message. A newer attempt makes older listeners inert.
  let imageAttempt = 0;
  function showImage(sceneId, src) {
    const sky = $("panorama");
    const attempt = ++imageAttempt;
    const detach = () => {
      sky.removeEventListener("materialtextureloaded", onLoaded);
      sky.removeEventListener("materialtextureloaderror", onError);
    };
    const onLoaded = () => {
      detach();
      if (attempt === imageAttempt) sceneLoaded(sceneId);
    };
    const onError = () => {
      detach();
      if (attempt !== imageAttempt) return;
      showError(sceneId, src);
      if (src === BLANK) return;
      showImage(sceneId, src === fallbackImage(sceneId) ? BLANK : fallbackImage(sceneId));
    };
    sky.addEventListener("materialtextureloaded", onLoaded);
    sky.addEventListener("materialtextureloaderror", onError);
    sky.setAttribute("src", src);
  }

  function display(sceneId) {
    const scene = project.scenes[sceneId];
    showImage(sceneId, images[sceneId]);
    renderHotspots(sceneId, scene);
    const sp = scene.startingPoint;
    if (sp) $("rig").setAttribute("rotation", (sp.pitch || 0) + " " + (sp.yaw || 0) + " " + (sp.roll || 0));
    playAmbient(sceneId, scene.globalSound);
    pendingTicket = ++ticket;
    const mine = pendingTicket;
    setTimeout(() => { if (pendingTicket === mine) sceneLoaded(sceneId); }, TIMING.fadeSafetyMs);
  }

  function sceneLoaded(sceneId) {
    const target = state.kind === "transitioning" ? state.to : state.scene;
    if (target !== sceneId || state.kind === "ready") return;
    pendingTicket = null;
    hideFade();
    state = { kind: "ready", scene: sceneId };
  }

  function navigateTo(target) {
    if (state.kind !== "ready") return;
    if (!project.scenes[target]) return;
    stopAmbient();
    showFade();
    state = { kind: "transitioning", from: state.scene, to: target };
    setTimeout(() => display(target), (STYLES.transition && STYLES.transition.fadeDurationMs) || 500);
  }

  async function start() {
    project = await loadConfig();
    const ids = Object.keys(project.scenes);
    for (const id of ids) images[id] = resolve(project.scenes[id].image, id);
    const entry = project.scenes[project.currentScene] ? project.currentScene : ids[0];
    state = { kind: "loading", scene: entry };
    await preloadAll();
    display(entry);
  }

  $("error-close").addEventListener("click", () => { $("error").hidden = true; });
  document.addEventListener("click", onUserInteraction);
  document.addEventListener("keydown", onUserInteraction);
  document.addEventListener("touchstart", onUserInteraction);
  window.panotour = { navigateTo };
  start();
})();
"##;
