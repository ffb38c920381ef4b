//! String-form in-page scripts with JSON input/output contracts
//!
//! Every script is a self-contained IIFE taking one `opts` object and
//! returning a JSON-serializable value. Selector misses are reported
//! in-band as `{found: false}`; absent devtools hooks degrade to
//! `{supported: false, reason}` instead of invented data.

use serde_json::{json, Value};

/// Shared page-side helpers: bounded serialization with cycle detection,
/// framework detection, fiber/instance discovery, selector hints.
const SUPPORT: &str = r##"
var MAX_STR = 500;
var MAX_ITEMS = 50;

function nodeLabel(el) {
  var id = el.id ? '#' + el.id : '';
  return '[Node ' + (el.tagName || el.nodeName || 'node').toLowerCase() + id + ']';
}

function serialize(value, maxDepth, depth, seen) {
  if (value === null || value === undefined) return null;
  var t = typeof value;
  if (t === 'string') return value.length > MAX_STR ? value.slice(0, MAX_STR) + '…[truncated]' : value;
  if (t === 'number') return isFinite(value) ? value : String(value);
  if (t === 'boolean') return value;
  if (t === 'function') return '[Function ' + (value.name || 'anonymous') + ']';
  if (t === 'symbol' || t === 'bigint') return String(value);
  if (typeof Node !== 'undefined' && value instanceof Node) return nodeLabel(value);
  if (seen.indexOf(value) !== -1) return '[Circular]';
  if (depth >= maxDepth) return Array.isArray(value) ? '[Array(' + value.length + ')]' : '[Object]';
  seen.push(value);
  var out;
  if (Array.isArray(value)) {
    out = value.slice(0, MAX_ITEMS).map(function (v) { return serialize(v, maxDepth, depth + 1, seen); });
    if (value.length > MAX_ITEMS) out.push('…[' + (value.length - MAX_ITEMS) + ' more]');
  } else {
    out = {};
    var keys = Object.keys(value);
    keys.slice(0, MAX_ITEMS).forEach(function (k) {
      try { out[k] = serialize(value[k], maxDepth, depth + 1, seen); }
      catch (e) { out[k] = '[Unserializable]'; }
    });
    if (keys.length > MAX_ITEMS) out['…'] = (keys.length - MAX_ITEMS) + ' more keys';
  }
  seen.pop();
  return out;
}
function ser(v, maxDepth) { return serialize(v, maxDepth || 4, 0, []); }

function ownFiber(el) {
  var keys = Object.keys(el);
  for (var i = 0; i < keys.length; i++) {
    if (keys[i].indexOf('__reactFiber$') === 0 || keys[i].indexOf('__reactInternalInstance$') === 0) {
      return el[keys[i]];
    }
  }
  return null;
}
function fiberOf(el) {
  for (var node = el; node; node = node.parentElement) {
    var f = ownFiber(node);
    if (f) return f;
  }
  return null;
}
function isComponentFiber(f) {
  return f && (typeof f.type === 'function' || (f.type && f.type.$$typeof));
}
function componentFiber(fiber) {
  for (var f = fiber; f; f = f.return) {
    if (isComponentFiber(f)) return f;
  }
  return null;
}
function fiberName(f) {
  if (!f) return null;
  var t = f.type;
  if (typeof t === 'string') return t;
  if (typeof t === 'function') return t.displayName || t.name || 'Anonymous';
  if (t && t.$$typeof) {
    if (t.render) return t.render.displayName || t.render.name || 'ForwardRef';
    if (t.displayName) return t.displayName;
    if (t.type) return t.type.displayName || t.type.name || 'Memo';
  }
  return null;
}

function vueOf(el) {
  for (var node = el; node; node = node.parentElement) {
    if (node.__vueParentComponent) return { version: 3, instance: node.__vueParentComponent };
    if (node.__vue_app__ && node.__vue_app__._instance) return { version: 3, instance: node.__vue_app__._instance };
    if (node.__vue__) return { version: 2, instance: node.__vue__ };
  }
  return null;
}
function vueName(instance, version) {
  if (version === 2) {
    return (instance.$options && (instance.$options.name || instance.$options._componentTag)) || 'Anonymous';
  }
  return (instance.type && (instance.type.name || instance.type.__name)) || 'Anonymous';
}

function ngComponentOf(el) {
  if (!(window.ng && typeof window.ng.getComponent === 'function')) return null;
  for (var node = el; node; node = node.parentElement) {
    var c = window.ng.getComponent(node);
    if (c) return c;
  }
  return null;
}

function detect(el) {
  var scope = el || document.body;
  if (fiberOf(scope)) {
    return { framework: 'react', devtools: !!window.__REACT_DEVTOOLS_GLOBAL_HOOK__ };
  }
  if (vueOf(scope)) {
    return { framework: 'vue', devtools: !!window.__VUE_DEVTOOLS_GLOBAL_HOOK__ };
  }
  var ngRoot = document.querySelector('[ng-version]');
  if (ngRoot) {
    return {
      framework: 'angular',
      version: ngRoot.getAttribute('ng-version'),
      devtools: !!(window.ng && window.ng.getComponent)
    };
  }
  if (document.querySelector('[class*=svelte-]')) {
    return { framework: 'svelte', devtools: false };
  }
  return { framework: 'unknown', devtools: false };
}

function cssPath(el) {
  if (el.id) return '#' + el.id;
  var path = [];
  for (var node = el; node && node.nodeType === 1 && path.length < 6; node = node.parentElement) {
    var seg = node.tagName.toLowerCase();
    if (node.id) { path.unshift(seg + '#' + node.id); break; }
    var cls = typeof node.className === 'string' ? node.className.trim().split(/\s+/)[0] : '';
    if (cls) seg += '.' + cls;
    var parent = node.parentElement;
    if (parent) {
      var same = Array.prototype.filter.call(parent.children, function (c) { return c.tagName === node.tagName; });
      if (same.length > 1) seg += ':nth-of-type(' + (Array.prototype.indexOf.call(same, node) + 1) + ')';
    }
    path.unshift(seg);
  }
  return path.join(' > ');
}

function visibility(el) {
  var rect = el.getBoundingClientRect();
  var style = window.getComputedStyle(el);
  return {
    rect: { x: Math.round(rect.x), y: Math.round(rect.y), width: Math.round(rect.width), height: Math.round(rect.height) },
    visible: rect.width > 0 && rect.height > 0 && style.display !== 'none' && style.visibility !== 'hidden'
  };
}
"##;

fn wrap(body: &str, opts: &Value) -> String {
    format!("(function(opts) {{\n'use strict';\n{SUPPORT}\n{body}\n}})({opts})")
}

fn wrap_async(body: &str, opts: &Value) -> String {
    format!("(async function(opts) {{\n'use strict';\n{SUPPORT}\n{body}\n}})({opts})")
}

pub fn detect(selector: Option<&str>) -> String {
    wrap(
        r##"
var el = opts.selector ? document.querySelector(opts.selector) : null;
if (opts.selector && !el) return { found: false, selector: opts.selector };
return detect(el);
"##,
        &json!({ "selector": selector }),
    )
}

pub fn tree(selector: Option<&str>, max_depth: u32, include_props: bool) -> String {
    wrap(
        r##"
var root = opts.selector ? document.querySelector(opts.selector) : document.body;
if (!root) return { found: false, selector: opts.selector };
var fw = detect(root);

function reactChildren(f) {
  var out = [];
  for (var c = f.child; c; c = c.sibling) out.push(c);
  return out;
}
function buildReact(f, depth) {
  var name = fiberName(f);
  var component = isComponentFiber(f) && name;
  var children = [];
  if (depth <= opts.maxDepth) {
    reactChildren(f).forEach(function (c) {
      children = children.concat(buildReact(c, component ? depth + 1 : depth));
    });
  }
  if (!component || depth > opts.maxDepth) return children;
  var node = { name: name, framework: 'react', depth: depth, children: children };
  if (opts.includeProps) {
    var props = Object.assign({}, f.memoizedProps);
    delete props.children;
    node.props = ser(props, 3);
  }
  return [node];
}

function buildVue(instance, version, depth) {
  var node = { name: vueName(instance, version), framework: 'vue', depth: depth, children: [] };
  if (opts.includeProps) node.props = ser(version === 2 ? instance.$props : instance.props, 3);
  if (depth >= opts.maxDepth) return node;
  if (version === 2) {
    (instance.$children || []).forEach(function (c) { node.children.push(buildVue(c, 2, depth + 1)); });
  } else if (instance.subTree) {
    collectVnode(instance.subTree, node, depth);
  }
  return node;
}
function collectVnode(vnode, parent, depth) {
  if (!vnode) return;
  if (vnode.component) { parent.children.push(buildVue(vnode.component, 3, depth + 1)); return; }
  var kids = Array.isArray(vnode.children) ? vnode.children : [];
  kids.forEach(function (k) { if (k && typeof k === 'object') collectVnode(k, parent, depth); });
}

function buildDom(el, depth) {
  var name = el.tagName.toLowerCase() + (el.id ? '#' + el.id : '');
  var ngc = fw.framework === 'angular' ? ngComponentOf(el) : null;
  if (ngc && ngc.constructor && ngc.constructor.name) name = ngc.constructor.name;
  var node = { name: name, framework: fw.framework, depth: depth, children: [] };
  if (depth < opts.maxDepth) {
    Array.prototype.forEach.call(el.children, function (c) { node.children.push(buildDom(c, depth + 1)); });
  }
  return node;
}

if (fw.framework === 'react') {
  var start = fiberOf(root);
  if (start) {
    var origin = start;
    if (!opts.selector) {
      while (origin.return) origin = origin.return;
    }
    return { framework: 'react', supported: true, tree: buildReact(origin, 0) };
  }
}
if (fw.framework === 'vue') {
  var v = vueOf(root);
  if (v) return { framework: 'vue', supported: true, tree: [buildVue(v.instance, v.version, 0)] };
}
return {
  framework: fw.framework,
  supported: fw.framework === 'angular',
  reason: fw.framework === 'angular' ? undefined : 'no framework hooks found; DOM heuristic tree',
  tree: [buildDom(root, 0)]
};
"##,
        &json!({ "selector": selector, "maxDepth": max_depth, "includeProps": include_props }),
    )
}

pub fn find_by_name(name: &str, exact: bool) -> String {
    wrap(
        r##"
var needle = opts.exact ? opts.name : opts.name.toLowerCase();
function matches(candidate) {
  if (!candidate) return false;
  return opts.exact ? candidate === needle : candidate.toLowerCase().indexOf(needle) !== -1;
}

var results = [];
var seenInstances = [];
var all = document.querySelectorAll('*');
for (var i = 0; i < all.length && results.length < 100; i++) {
  var el = all[i];
  var componentName = null;
  var key = null;

  var f = ownFiber(el);
  if (f) {
    var cf = componentFiber(f);
    if (cf) { componentName = fiberName(cf); key = cf; }
  }
  if (!componentName && el.__vueParentComponent) {
    componentName = vueName(el.__vueParentComponent, 3);
    key = el.__vueParentComponent;
  }
  if (!componentName && el.__vue__) {
    componentName = vueName(el.__vue__, 2);
    key = el.__vue__;
  }
  if (!componentName) {
    var ngc = ngComponentOf(el);
    if (ngc && window.ng.getComponent(el)) {
      componentName = ngc.constructor && ngc.constructor.name;
      key = ngc;
    }
  }
  if (!componentName && el.dataset && el.dataset.component) {
    componentName = el.dataset.component;
    key = el;
  }

  if (componentName && matches(componentName) && key && seenInstances.indexOf(key) === -1) {
    seenInstances.push(key);
    var vis = visibility(el);
    results.push({
      name: componentName,
      selector: cssPath(el),
      boundingBox: vis.rect,
      visible: vis.visible
    });
  }
}
return { framework: detect(document.body).framework, instances: results };
"##,
        &json!({ "name": name, "exact": exact }),
    )
}

pub fn get_props(selector: &str, include_defaults: bool) -> String {
    wrap(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);

if (fw.framework === 'react') {
  var f = componentFiber(fiberOf(el));
  if (!f) return { framework: 'react', supported: false, reason: 'element has no component fiber' };
  var props = Object.assign({}, f.memoizedProps);
  delete props.children;
  if (!opts.includeDefaults && f.type && f.type.defaultProps) {
    Object.keys(f.type.defaultProps).forEach(function (k) {
      if (props[k] === f.type.defaultProps[k]) delete props[k];
    });
  }
  return { framework: 'react', supported: true, component: fiberName(f), props: ser(props, 4) };
}
if (fw.framework === 'vue') {
  var v = vueOf(el);
  var props2 = v.version === 2 ? v.instance.$props : v.instance.props;
  return { framework: 'vue', supported: true, component: vueName(v.instance, v.version), props: ser(props2, 4) };
}
if (fw.framework === 'angular') {
  var ngc = ngComponentOf(el);
  if (!ngc) return { framework: 'angular', supported: false, reason: 'ng.getComponent found no component (production mode strips debug APIs)' };
  return { framework: 'angular', supported: true, component: ngc.constructor && ngc.constructor.name, props: ser(ngc, 3) };
}
return { framework: fw.framework, supported: false, reason: 'no devtools hook exposes props for this framework' };
"##,
        &json!({ "selector": selector, "includeDefaults": include_defaults }),
    )
}

pub fn get_state(selector: &str, include_computed: bool) -> String {
    wrap(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);

if (fw.framework === 'react') {
  var f = componentFiber(fiberOf(el));
  if (!f) return { framework: 'react', supported: false, reason: 'element has no component fiber' };
  if (f.stateNode && f.stateNode.state) {
    return { framework: 'react', supported: true, component: fiberName(f), kind: 'class', state: ser(f.stateNode.state, 4) };
  }
  var states = [];
  for (var hook = f.memoizedState; hook; hook = hook.next) {
    if (hook.queue) states.push(ser(hook.memoizedState, 3));
  }
  return { framework: 'react', supported: true, component: fiberName(f), kind: 'hooks', state: states };
}
if (fw.framework === 'vue') {
  var v = vueOf(el);
  var state;
  if (v.version === 2) {
    state = ser(v.instance.$data, 4);
    if (opts.includeComputed && v.instance._computedWatchers) {
      var computed = {};
      Object.keys(v.instance._computedWatchers).forEach(function (k) { computed[k] = ser(v.instance[k], 3); });
      return { framework: 'vue', supported: true, state: state, computed: computed };
    }
  } else {
    state = ser(v.instance.setupState, 4);
    if (v.instance.data && Object.keys(v.instance.data).length) {
      state = { setup: state, data: ser(v.instance.data, 4) };
    }
  }
  return { framework: 'vue', supported: true, component: vueName(v.instance, v.version), state: state };
}
if (fw.framework === 'angular') {
  var ngc = ngComponentOf(el);
  if (!ngc) return { framework: 'angular', supported: false, reason: 'ng.getComponent found no component (production mode strips debug APIs)' };
  return { framework: 'angular', supported: true, component: ngc.constructor && ngc.constructor.name, state: ser(ngc, 3) };
}
return { framework: fw.framework, supported: false, reason: 'no devtools hook exposes state for this framework' };
"##,
        &json!({ "selector": selector, "includeComputed": include_computed }),
    )
}

pub fn get_hooks(selector: &str, include_effects: bool) -> String {
    wrap(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);
if (fw.framework !== 'react') {
  return { framework: fw.framework, supported: false, reason: 'hooks are a React concept' };
}
var f = componentFiber(fiberOf(el));
if (!f) return { framework: 'react', supported: false, reason: 'element has no component fiber' };
if (typeof f.type !== 'function' || (f.stateNode && f.stateNode.state)) {
  return { framework: 'react', supported: false, reason: 'component is not a function component' };
}
var hooks = [];
var index = 0;
for (var hook = f.memoizedState; hook; hook = hook.next) {
  var kind = 'other';
  var value = hook.memoizedState;
  if (hook.queue) kind = 'state';
  else if (value && typeof value === 'object' && typeof value.create === 'function') kind = 'effect';
  else if (value && typeof value === 'object' && 'current' in value && Object.keys(value).length === 1) kind = 'ref';
  if (kind === 'effect' && !opts.includeEffects) { index++; continue; }
  hooks.push({
    index: index,
    kind: kind,
    value: kind === 'effect' ? '[Effect ' + ((value.deps && value.deps.length) || 0) + ' deps]' : ser(value, 3)
  });
  index++;
}
return { framework: 'react', supported: true, component: fiberName(f), hooks: hooks };
"##,
        &json!({ "selector": selector, "includeEffects": include_effects }),
    )
}

pub fn get_context(selector: &str, include_providers: bool) -> String {
    wrap(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);

if (fw.framework === 'react') {
  var f = componentFiber(fiberOf(el));
  if (!f) return { framework: 'react', supported: false, reason: 'element has no component fiber' };
  var contexts = [];
  for (var node = f.return; node; node = node.return) {
    var t = node.type;
    if (t && t._context) {
      var entry = {
        name: t._context.displayName || 'Context',
        value: ser(node.memoizedProps && node.memoizedProps.value, 3)
      };
      if (opts.includeProviders) entry.provider = fiberName(node) || 'Provider';
      contexts.push(entry);
    }
  }
  return { framework: 'react', supported: true, component: fiberName(f), contexts: contexts };
}
if (fw.framework === 'vue') {
  var v = vueOf(el);
  if (v.version === 3 && v.instance.provides) {
    var provided = {};
    Object.keys(v.instance.provides).forEach(function (k) { provided[k] = ser(v.instance.provides[k], 3); });
    return { framework: 'vue', supported: true, contexts: provided };
  }
  return { framework: 'vue', supported: false, reason: 'provide/inject inspection needs Vue 3' };
}
return { framework: fw.framework, supported: false, reason: 'no context concept or hook for this framework' };
"##,
        &json!({ "selector": selector, "includeProviders": include_providers }),
    )
}

pub fn track_renders(selector: &str, duration_ms: u64, capture_reasons: bool) -> String {
    wrap_async(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);
var events = [];
var t0 = performance.now();
var method;

var hook = window.__REACT_DEVTOOLS_GLOBAL_HOOK__;
if (fw.framework === 'react' && hook && typeof hook.onCommitFiberRoot === 'function') {
  method = 'devtools-commit';
  var prev = hook.onCommitFiberRoot;
  hook.onCommitFiberRoot = function () {
    var entry = { atMs: Math.round(performance.now() - t0), source: 'commit' };
    if (opts.captureReasons) entry.reason = 'commit';
    events.push(entry);
    return prev.apply(hook, arguments);
  };
  await new Promise(function (resolve) { setTimeout(resolve, opts.durationMs); });
  hook.onCommitFiberRoot = prev;
} else {
  // No devtools hook: subtree mutations approximate renders.
  method = 'mutation-observer';
  var observer = new MutationObserver(function (mutations) {
    var entry = { atMs: Math.round(performance.now() - t0), source: 'mutation' };
    if (opts.captureReasons) entry.reason = mutations.length + ' DOM mutation(s)';
    events.push(entry);
  });
  observer.observe(el, { subtree: true, childList: true, attributes: true, characterData: true });
  await new Promise(function (resolve) { setTimeout(resolve, opts.durationMs); });
  observer.disconnect();
}

var averageMs = 0;
if (events.length > 1) {
  averageMs = Math.round((events[events.length - 1].atMs - events[0].atMs) / (events.length - 1));
}
return {
  framework: fw.framework,
  method: method,
  durationMs: opts.durationMs,
  count: events.length,
  events: events.slice(0, 100),
  averageMs: averageMs
};
"##,
        &json!({ "selector": selector, "durationMs": duration_ms, "captureReasons": capture_reasons }),
    )
}

pub fn get_source(selector: &str) -> String {
    wrap(
        r##"
var el = document.querySelector(opts.selector);
if (!el) return { found: false, selector: opts.selector };
var fw = detect(el);

if (fw.framework === 'react') {
  var f = componentFiber(fiberOf(el));
  if (!f) return { framework: 'react', supported: false, reason: 'element has no component fiber' };
  var src = f._debugSource;
  if (src && src.fileName) {
    return {
      framework: 'react',
      supported: true,
      component: fiberName(f),
      file: src.fileName,
      line: src.lineNumber || 1,
      column: src.columnNumber || 1,
      generated: false
    };
  }
  return { framework: 'react', supported: false, reason: 'fiber carries no _debugSource (production builds strip it)' };
}
if (fw.framework === 'vue') {
  var v = vueOf(el);
  var file = v.version === 3 && v.instance.type && v.instance.type.__file;
  if (file) {
    return { framework: 'vue', supported: true, component: vueName(v.instance, v.version), file: file, line: 1, column: 1, generated: false };
  }
  return { framework: 'vue', supported: false, reason: 'component carries no __file info' };
}
return { framework: fw.framework, supported: false, reason: 'no source info hook for this framework' };
"##,
        &json!({ "selector": selector }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_embed_options_as_json() {
        let script = get_props("#app [data-x='1']", true);
        assert!(script.contains(r#""selector":"#));
        assert!(script.contains("includeDefaults"));
        assert!(script.starts_with("(function(opts)"));
    }

    #[test]
    fn selector_quoting_is_json_escaped() {
        // A selector with quotes must not break out of the opts literal.
        let script = tree(Some(r#"div[title="x"]"#), 5, false);
        assert!(script.contains(r#"div[title=\"x\"]"#));
    }

    #[test]
    fn track_renders_is_async() {
        let script = track_renders("#app", 1000, false);
        assert!(script.starts_with("(async function(opts)"));
        assert!(script.contains("MutationObserver"));
    }
}
