//! Yew integration.
//!
//! Wrap the application in a [`CacheProvider`], then read cached requests from components with
//! [`use_cached`]. Components re-render whenever the entry they read changes, and stop listening
//! when they unmount or switch to another request.
use crate::{Cache, CacheEntry, KeyedEntry, Request};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct CacheProviderProps {
    pub cache: Cache,
    pub children: Children,
}

#[function_component]
pub fn CacheProvider(props: &CacheProviderProps) -> Html {
    let context = props.cache.clone();
    html! {
        <ContextProvider<Cache> {context}>
        { for props.children.iter() }
        </ContextProvider<Cache>>
    }
}

/// The cache provided by the enclosing [`CacheProvider`].
///
/// # Panics
///
/// Panics when used outside of a [`CacheProvider`].
#[hook]
pub fn use_cache() -> Cache {
    use_context::<Cache>().expect("Cache not present")
}

/// Subscribe the current component to a request.
///
/// Returns the current entry. The request is fetched on mount according to the cache's
/// [`FetchPolicy`](crate::FetchPolicy). When the request changes, the entry of the new request
/// is returned right away, and updates still arriving for the old one are ignored.
#[hook]
pub fn use_cached(request: Request) -> CacheEntry {
    let key = request.key();
    #[cfg(feature = "log")]
    log::debug!("use_cached({key})");
    let cache = use_cache();
    let state = {
        let cache = cache.clone();
        let request = request.clone();
        use_state_eq(move || KeyedEntry::new(request.key(), cache.get(&request)))
    };
    let active = use_mut_ref(|| key.clone());
    *active.borrow_mut() = key.clone();
    {
        let cache = cache.clone();
        let state = state.clone();
        use_effect_with_deps(
            move |request: &Request| {
                let key = request.key();
                let setter = state.setter();
                let subscription = {
                    let key = key.clone();
                    cache.subscribe(request, move |entry| {
                        if *active.borrow() == key {
                            setter.set(KeyedEntry::new(key.clone(), entry.clone()));
                        }
                    })
                };
                state.set(KeyedEntry::new(key, subscription.current()));
                move || drop(subscription)
            },
            request.clone(),
        );
    }
    state
        .entry_for(&key)
        .cloned()
        .unwrap_or_else(|| cache.get(&request))
}
