use odata_writer_core::{Entry, Feed, Mode, NavigationLink, Projection, WriterState};

use super::duplicate::DuplicatePropertyNamesChecker;
use crate::backend::ScopeKind;
use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) enum ScopeItem {
    Feed(Feed),
    Entry {
        entry: Option<Entry>,
        /// Property and link names written for this entry so far.
        names: DuplicatePropertyNamesChecker,
    },
    NavigationLink {
        link: NavigationLink,
        content: LinkContent,
    },
}

impl ScopeItem {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeItem::Feed(_) => ScopeKind::Feed,
            ScopeItem::Entry { .. } => ScopeKind::Entry,
            ScopeItem::NavigationLink { .. } => ScopeKind::NavigationLink,
        }
    }

    pub fn state(&self) -> WriterState {
        match self {
            ScopeItem::Feed(_) => WriterState::Feed,
            ScopeItem::Entry { .. } => WriterState::Entry,
            ScopeItem::NavigationLink { content, .. } if content.started => {
                WriterState::NavigationLinkWithContent
            }
            ScopeItem::NavigationLink { .. } => WriterState::NavigationLink,
        }
    }

    pub fn link(&self) -> Option<&NavigationLink> {
        match self {
            ScopeItem::NavigationLink { link, .. } => Some(link),
            _ => None,
        }
    }

    pub fn as_feed(&self) -> Result<&Feed> {
        match self {
            ScopeItem::Feed(feed) => Ok(feed),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_entry(&self) -> Result<Option<&Entry>> {
        match self {
            ScopeItem::Entry { entry, .. } => Ok(entry.as_ref()),
            _ => Err(self.mismatch()),
        }
    }

    pub fn as_link(&self) -> Result<&NavigationLink> {
        self.link().ok_or_else(|| self.mismatch())
    }

    fn mismatch(&self) -> Error {
        Error::usage(
            self.state(),
            "the current scope does not match the operation",
        )
    }
}

/// One nesting level.
#[derive(Debug)]
pub(crate) struct Scope<S> {
    pub item: ScopeItem,
    /// Set when this scope or an ancestor is excluded by the projection.
    pub skip_writing: bool,
    /// Children written so far: entries of a feed, links of an entry,
    /// content items of a link.
    pub item_count: usize,
    /// Siblings written before this scope within its parent.
    pub index: usize,
    pub projection: Projection,
    /// Recursion depth before this scope entered the guard.
    pub depth_at_start: usize,
    pub ext: S,
}

impl<S> Scope<S> {
    pub fn state(&self) -> WriterState {
        self.item.state()
    }
}

/// One item of navigation link content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Content {
    Reference,
    Feed,
    Entry,
    NullEntry,
}

/// What has been written as content of one navigation link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinkContent {
    /// Whether the backend has been told the link has content.
    pub started: bool,
    pub items: usize,
    pub feeds: usize,
}

impl LinkContent {
    /// Accepts one more content item for `link`, settling its collection-ness
    /// from the content in responses when it was left undeclared.
    pub fn admit(&mut self, link: &mut NavigationLink, mode: Mode, content: Content) -> Result<()> {
        let state = if self.started {
            WriterState::NavigationLinkWithContent
        } else {
            WriterState::NavigationLink
        };

        if content == Content::Reference && mode.is_response() {
            return Err(Error::usage(
                state,
                "entity reference links are only valid in requests",
            ));
        }

        let is_collection = match link.is_collection {
            Some(is_collection) => is_collection,
            None if mode.is_request() => {
                return Err(Error::MissingMetadata {
                    link: link.name.clone(),
                    message: "must declare whether it targets a collection before content is written",
                })
            }
            None => {
                let inferred = content == Content::Feed;
                link.is_collection = Some(inferred);
                inferred
            }
        };

        if is_collection {
            match content {
                Content::Entry | Content::NullEntry => {
                    return Err(Error::usage(
                        state,
                        "an entry in a collection navigation link must be written inside a feed",
                    ))
                }
                Content::Feed if self.feeds > 0 => {
                    return Err(Error::usage(
                        state,
                        "a navigation link takes at most one expanded feed",
                    ))
                }
                Content::Feed | Content::Reference => {}
            }
        } else if content == Content::Feed {
            return Err(Error::usage(
                state,
                "a single-valued navigation link cannot contain a feed",
            ));
        } else if self.items > 0 {
            return Err(Error::usage(
                state,
                "a single-valued navigation link takes at most one item",
            ));
        }

        if mode.is_response() && self.items > 0 {
            return Err(Error::usage(
                state,
                "response navigation link content is exactly one entry or feed",
            ));
        }

        self.items += 1;
        if content == Content::Feed {
            self.feeds += 1;
        }
        Ok(())
    }
}

/// The ordered nesting context. The last scope is the current one.
#[derive(Debug)]
pub(crate) struct ScopeStack<S> {
    scopes: Vec<Scope<S>>,
    completed: bool,
}

impl<S> Default for ScopeStack<S> {
    fn default() -> Self {
        Self {
            scopes: Vec::new(),
            completed: false,
        }
    }
}

impl<S> ScopeStack<S> {
    pub fn state(&self) -> WriterState {
        match self.scopes.last() {
            Some(scope) => scope.state(),
            None if self.completed => WriterState::Completed,
            None => WriterState::Start,
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn top(&self) -> Option<&Scope<S>> {
        self.scopes.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Scope<S>> {
        self.scopes.last_mut()
    }

    pub fn push(&mut self, scope: Scope<S>) {
        debug_assert!(!self.completed, "push after completion");
        self.scopes.push(scope);
    }

    /// Pops the current scope, completing the stack when it was the last one.
    pub fn pop(&mut self) -> Option<Scope<S>> {
        let scope = self.scopes.pop()?;
        if self.scopes.is_empty() {
            self.completed = true;
        }
        Some(scope)
    }

    /// The current scope and the one enclosing it.
    pub fn split_current_mut(&mut self) -> Option<(&mut Scope<S>, Option<&mut Scope<S>>)> {
        let (current, ancestors) = self.scopes.split_last_mut()?;
        Some((current, ancestors.last_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_scope(link: NavigationLink) -> Scope<()> {
        Scope {
            item: ScopeItem::NavigationLink {
                link,
                content: LinkContent::default(),
            },
            skip_writing: false,
            item_count: 0,
            index: 0,
            projection: Projection::all(),
            depth_at_start: 0,
            ext: (),
        }
    }

    fn admit_all(link: &mut NavigationLink, mode: Mode, contents: &[Content]) -> Result<()> {
        let mut content = LinkContent::default();
        for item in contents {
            content.admit(link, mode, *item)?;
            content.started = true;
        }
        Ok(())
    }

    #[test]
    fn test_stack_states() {
        let mut stack = ScopeStack::default();
        assert_eq!(stack.state(), WriterState::Start);

        stack.push(link_scope(NavigationLink::new("Orders")));
        assert_eq!(stack.state(), WriterState::NavigationLink);
        if let Some(Scope {
            item: ScopeItem::NavigationLink { content, .. },
            ..
        }) = stack.top_mut()
        {
            content.started = true;
        }
        assert_eq!(stack.state(), WriterState::NavigationLinkWithContent);

        assert!(stack.pop().is_some());
        assert_eq!(stack.state(), WriterState::Completed);
        assert!(stack.pop().is_none());
        assert_eq!(stack.state(), WriterState::Completed);
    }

    #[test]
    fn test_split_current() {
        let mut stack = ScopeStack::default();
        assert!(stack.split_current_mut().is_none());
        stack.push(link_scope(NavigationLink::new("A")));
        stack.push(link_scope(NavigationLink::new("B")));
        let (current, parent) = stack.split_current_mut().unwrap();
        assert_eq!(current.item.link().unwrap().name, "B");
        assert_eq!(parent.unwrap().item.link().unwrap().name, "A");
    }

    #[test]
    fn test_request_collection_content() {
        let mut link = NavigationLink::new("Orders").collection(true);
        admit_all(
            &mut link,
            Mode::Request,
            &[Content::Reference, Content::Reference, Content::Feed, Content::Reference],
        )
        .unwrap();

        let err = admit_all(&mut link, Mode::Request, &[Content::Feed, Content::Feed]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));

        let err = admit_all(&mut link, Mode::Request, &[Content::Entry]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
    }

    #[test]
    fn test_request_single_content() {
        let mut link = NavigationLink::new("Customer").collection(false);
        admit_all(&mut link, Mode::Request, &[Content::Entry]).unwrap();
        admit_all(&mut link, Mode::Request, &[Content::Reference]).unwrap();
        admit_all(&mut link, Mode::Request, &[Content::NullEntry]).unwrap();

        let err =
            admit_all(&mut link, Mode::Request, &[Content::Reference, Content::Entry]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
        let err = admit_all(&mut link, Mode::Request, &[Content::Entry, Content::Entry]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
        let err = admit_all(&mut link, Mode::Request, &[Content::Feed]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
    }

    #[test]
    fn test_request_requires_collection_declaration() {
        for content in [Content::Reference, Content::Feed, Content::Entry] {
            let mut link = NavigationLink::new("Orders");
            let err = admit_all(&mut link, Mode::Request, &[content]).unwrap_err();
            assert!(matches!(err, Error::MissingMetadata { .. }));
        }
    }

    #[test]
    fn test_response_content() {
        let mut link = NavigationLink::new("Orders");
        admit_all(&mut link, Mode::Response, &[Content::Feed]).unwrap();
        assert_eq!(link.is_collection, Some(true));

        let mut link = NavigationLink::new("Customer");
        admit_all(&mut link, Mode::Response, &[Content::NullEntry]).unwrap();
        assert_eq!(link.is_collection, Some(false));

        let mut link = NavigationLink::new("Orders").collection(true);
        let err = admit_all(&mut link, Mode::Response, &[Content::Reference]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));

        let mut link = NavigationLink::new("Orders");
        let err = admit_all(&mut link, Mode::Response, &[Content::Reference]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));

        let mut link = NavigationLink::new("Customer").collection(true);
        let err = admit_all(&mut link, Mode::Response, &[Content::Entry]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
    }
}
