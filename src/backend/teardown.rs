// Teardown stack - Reverse-order resource release
//
// Every acquired Vulkan object registers a release closure here.
// Closures capture the handles they destroy by value and run strictly
// last-in-first-out, exactly once.

/// One deferred release action
struct Release {
    label: &'static str,
    action: Box<dyn FnOnce()>,
}

/// LIFO list of release actions owned by one context
#[derive(Default)]
pub struct TeardownStack {
    entries: Vec<Release>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the release action for a resource that was just acquired
    pub fn push(&mut self, label: &'static str, action: impl FnOnce() + 'static) {
        self.entries.push(Release {
            label,
            action: Box::new(action),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in push order
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.label)
    }

    /// Pop and run every entry, newest first. Safe to call again.
    pub fn release_all(&mut self) {
        while let Some(entry) = self.entries.pop() {
            log::debug!("Releasing {}", entry.label);
            (entry.action)();
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> Box<dyn FnOnce()> {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn releases_in_reverse_push_order() {
        let (log, make) = recorder();
        let mut stack = TeardownStack::new();

        let stages = ["instance", "surface", "device", "swapchain", "image views"];
        for stage in stages {
            stack.push(stage, make(stage));
        }
        assert_eq!(stack.len(), stages.len());
        assert_eq!(stack.labels().collect::<Vec<_>>(), stages);

        stack.release_all();

        let mut expected = stages.to_vec();
        expected.reverse();
        assert_eq!(*log.borrow(), expected);
        assert!(stack.is_empty());
    }

    #[test]
    fn second_release_is_a_no_op() {
        let (log, make) = recorder();
        let mut stack = TeardownStack::new();
        stack.push("a", make("a"));
        stack.push("b", make("b"));

        stack.release_all();
        stack.release_all();

        assert_eq!(*log.borrow(), ["b", "a"]);
    }

    #[test]
    fn drop_releases_remaining_entries() {
        let (log, make) = recorder();
        {
            let mut stack = TeardownStack::new();
            stack.push("instance", make("instance"));
            stack.push("surface", make("surface"));
        }
        assert_eq!(*log.borrow(), ["surface", "instance"]);
    }

    #[test]
    fn entries_pushed_after_release_run_on_next_release() {
        let (log, make) = recorder();
        let mut stack = TeardownStack::new();
        stack.push("first", make("first"));
        stack.release_all();
        stack.push("second", make("second"));
        drop(stack);

        assert_eq!(*log.borrow(), ["first", "second"]);
    }
}
