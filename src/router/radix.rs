//! Radix tree for route lookup.
//!
//! Paths are split into `/`-separated segments. Static segments (`pets`) match
//! exactly; parameter segments (`{id}`) match any single segment and record its value.
//! Static children are tried before parameter children, so `/pets/mine` wins over
//! `/pets/{id}` for the path `/pets/mine`. Lookup cost is proportional to the number
//! of segments in the request path, not the number of routes.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{ParamVec, RouteEntry};

#[derive(Default)]
struct RadixNode {
    segment: String,
    /// Parameter name when this node is a `{param}` segment
    param_name: Option<Arc<str>>,
    /// Routes terminating at this node, keyed by method
    routes: HashMap<Method, Arc<RouteEntry>>,
    children: Vec<RadixNode>,
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn insert(&mut self, segments: &[&str], method: Method, entry: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.routes.insert(method, entry);
        };

        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(name))
            {
                return child.insert(remaining, method, entry);
            }
            let mut child = RadixNode {
                param_name: Some(Arc::from(name)),
                ..RadixNode::default()
            };
            let replaced = child.insert(remaining, method, entry);
            self.param_children.push(child);
            return replaced;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *segment) {
            return child.insert(remaining, method, entry);
        }
        let mut child = RadixNode {
            segment: (*segment).to_string(),
            ..RadixNode::default()
        };
        let replaced = child.insert(remaining, method, entry);
        self.children.push(child);
        replaced
    }

    fn search(&self, segments: &[&str], method: &Method, params: &mut ParamVec) -> Option<Arc<RouteEntry>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.routes.get(method).cloned();
        };

        for child in &self.children {
            if child.segment == *segment {
                if let Some(entry) = child.search(remaining, method, params) {
                    return Some(entry);
                }
            }
        }

        for child in &self.param_children {
            let Some(name) = &child.param_name else {
                continue;
            };
            params.push((Arc::clone(name), (*segment).to_string()));
            if let Some(entry) = child.search(remaining, method, params) {
                return Some(entry);
            }
            // Backtrack
            params.pop();
        }

        None
    }

    fn allowed(&self, segments: &[&str], out: &mut Vec<Method>) {
        let Some((segment, remaining)) = segments.split_first() else {
            out.extend(self.routes.keys().cloned());
            return;
        };
        for child in self.children.iter().filter(|c| c.segment == *segment) {
            child.allowed(remaining, out);
        }
        for child in &self.param_children {
            child.allowed(remaining, out);
        }
    }
}

/// Method + path route tree.
#[derive(Default)]
pub(crate) struct RadixTree {
    root: RadixNode,
    len: usize,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl RadixTree {
    /// Insert a route; returns the entry it replaced, if any.
    pub(crate) fn insert(&mut self, method: Method, pattern: &str, entry: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        let replaced = self.root.insert(&segments(pattern), method, entry);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<RouteEntry>, ParamVec)> {
        let mut params = ParamVec::new();
        self.root
            .search(&segments(path), method, &mut params)
            .map(|entry| (entry, params))
    }

    /// Methods registered for any pattern matching `path`.
    pub(crate) fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut out = Vec::new();
        self.root.allowed(&segments(path), &mut out);
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        out.dedup();
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
