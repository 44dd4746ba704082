use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use poly_lazy::{
   initializer, same_value, value, Error, Initializer, LazyLoader, Module, ModuleSpec, Namespace,
   Registry, Status,
};

fn slow_counting(counter: Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Initializer> {
   Arc::new(initializer::from_fn(move |module| {
      counter.fetch_add(1, Ordering::SeqCst);
      thread::sleep(delay);
      module.set("value", value(42u32))?;
      Ok(())
   }))
}

fn register(registry: &Arc<Registry>, name: &str, init: Arc<dyn Initializer>) -> Arc<Module> {
   let module = LazyLoader::new(init)
      .with_registry(registry)
      .create(ModuleSpec::new(name))
      .unwrap();
   registry.register(name, Arc::clone(&module));
   module
}

fn wait_for_status(module: &Module, status: Status) {
   while module.status() != status {
      thread::yield_now();
   }
}

#[test]
fn test_multi_thread_executes_once() {
   let registry = Arc::new(Registry::new());
   let counter = Arc::new(AtomicUsize::new(0));
   let module = register(
      &registry,
      "shared",
      slow_counting(Arc::clone(&counter), Duration::from_millis(20)),
   );

   let barrier = Arc::new(Barrier::new(16));
   let threads: Vec<_> = (0..16)
      .map(|_| {
         let module = Arc::clone(&module);
         let barrier = Arc::clone(&barrier);
         thread::spawn(move || {
            barrier.wait();
            *module.get_as::<u32>("value").unwrap()
         })
      })
      .collect();

   for handle in threads {
      assert_eq!(handle.join().unwrap(), 42);
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
   assert_eq!(module.status(), Status::Done);
}

#[test]
fn test_all_threads_see_same_value() {
   let counter = Arc::new(AtomicUsize::new(0));
   let module = LazyLoader::new(slow_counting(Arc::clone(&counter), Duration::from_millis(5)))
      .create(ModuleSpec::new("shared"))
      .unwrap();

   let threads: Vec<_> = (0..8)
      .map(|_| {
         let module = Arc::clone(&module);
         thread::spawn(move || module.get("value").unwrap())
      })
      .collect();
   let values: Vec<_> = threads.into_iter().map(|h| h.join().unwrap()).collect();
   for v in &values[1..] {
      assert!(same_value(&values[0], v));
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_identity_substitution() {
   let registry = Arc::new(Registry::new());
   let rebinder = Arc::clone(&registry);
   let module = register(
      &registry,
      "net",
      Arc::new(initializer::from_fn(move |module| {
         let impostor = Module::loaded(ModuleSpec::new(module.name()), Namespace::new());
         rebinder.register(module.name(), Arc::new(impostor));
         Ok(())
      })),
   );

   let err = module.get("anything").unwrap_err();
   assert!(matches!(err, Error::IdentitySubstitution { ref name } if name == "net"));
   // Stuck in progress for good.
   assert_eq!(module.status(), Status::InProgress);
   assert!(matches!(module.get("anything"), Err(Error::Poisoned { .. })));
   assert!(!registry.is_current("net", &module));
}

#[test]
fn test_unregistered_during_load_is_not_substitution() {
   let registry = Arc::new(Registry::new());
   let remover = Arc::clone(&registry);
   let module = register(
      &registry,
      "net",
      Arc::new(initializer::from_fn(move |module| {
         remover.remove(module.name());
         module.set("ok", value(true))?;
         Ok(())
      })),
   );
   assert!(*module.get_as::<bool>("ok").unwrap());
   assert!(!registry.contains("net"));
}

#[test]
fn test_identity_check_skipped_without_registry() {
   let registry = Arc::new(Registry::new());
   let module = register(
      &registry,
      "net",
      Arc::new(initializer::from_fn(|module| {
         module.set("ok", value(true))?;
         Ok(())
      })),
   );
   // Loader only holds a weak handle.
   drop(registry);
   assert!(*module.get_as::<bool>("ok").unwrap());
}

#[test]
fn test_failed_initializer_poisons() {
   let counter = Arc::new(AtomicUsize::new(0));
   let hits = Arc::clone(&counter);
   let module = LazyLoader::new(Arc::new(initializer::from_fn(move |_| {
      hits.fetch_add(1, Ordering::SeqCst);
      Err("disk on fire".into())
   })))
   .create(ModuleSpec::new("fragile"))
   .unwrap();

   match module.get("x").unwrap_err() {
      Error::Initializer { name, source } => {
         assert_eq!(name, "fragile");
         assert_eq!(source.to_string(), "disk on fire");
      }
      other => panic!("unexpected error: {other}"),
   }
   assert_eq!(module.status(), Status::InProgress);

   // No retry.
   assert!(matches!(module.get("x"), Err(Error::Poisoned { .. })));
   assert!(matches!(module.delete("x"), Err(Error::Poisoned { .. })));
   assert!(matches!(module.set("x", value(1u8)), Err(Error::Poisoned { .. })));
   assert!(matches!(module.load(), Err(Error::Poisoned { .. })));
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_initializer_poisons() {
   let module = LazyLoader::new(Arc::new(initializer::from_fn(|_| panic!("boom"))))
      .create(ModuleSpec::new("panicky"))
      .unwrap();

   let result = panic::catch_unwind(AssertUnwindSafe(|| module.get("x")));
   assert!(result.is_err());
   assert_eq!(module.status(), Status::InProgress);
   assert!(matches!(module.get("x"), Err(Error::Poisoned { .. })));
}

#[test]
fn test_waiters_wake_on_failure() {
   let module = LazyLoader::new(Arc::new(initializer::from_fn(|_| {
      thread::sleep(Duration::from_millis(30));
      Err("late failure".into())
   })))
   .create(ModuleSpec::new("fragile"))
   .unwrap();

   let barrier = Arc::new(Barrier::new(8));
   let threads: Vec<_> = (0..8)
      .map(|_| {
         let module = Arc::clone(&module);
         let barrier = Arc::clone(&barrier);
         thread::spawn(move || {
            barrier.wait();
            module.load()
         })
      })
      .collect();

   let mut initializer_errors = 0;
   let mut poisoned = 0;
   for handle in threads {
      match handle.join().unwrap() {
         Err(Error::Initializer { .. }) => initializer_errors += 1,
         Err(Error::Poisoned { .. }) => poisoned += 1,
         other => panic!("unexpected result: {other:?}"),
      }
   }
   assert_eq!(initializer_errors, 1);
   assert_eq!(poisoned, 7);
}

#[test]
fn test_write_during_foreign_promotion_waits() {
   let started = Arc::new(Barrier::new(2));
   let gate = Arc::clone(&started);
   let module = LazyLoader::new(Arc::new(initializer::from_fn(move |module| {
      gate.wait();
      thread::sleep(Duration::from_millis(30));
      module.set("key", value(String::from("init")))?;
      Ok(())
   })))
   .create(ModuleSpec::new("racy"))
   .unwrap();

   let loader_thread = {
      let module = Arc::clone(&module);
      thread::spawn(move || module.load())
   };
   started.wait();
   wait_for_status(&module, Status::InProgress);

   // Lands after the promotion, so it overrides the initializer.
   module.set("key", value(String::from("mine"))).unwrap();
   assert_eq!(module.status(), Status::Done);
   assert_eq!(module.get_as::<String>("key").unwrap().as_str(), "mine");
   loader_thread.join().unwrap().unwrap();
}

#[test]
fn test_unrelated_modules_promote_independently() {
   let inner = LazyLoader::new(Arc::new(initializer::from_fn(|module| {
      module.set("depth", value(2u32))?;
      Ok(())
   })))
   .create(ModuleSpec::new("inner"))
   .unwrap();

   let dependency = Arc::clone(&inner);
   let outer = LazyLoader::new(Arc::new(initializer::from_fn(move |module| {
      // Load another module on another thread while this one is held.
      let dependency = Arc::clone(&dependency);
      let depth = thread::spawn(move || dependency.get_as::<u32>("depth"))
         .join()
         .map_err(|_| "inner loader panicked")??;
      module.set("depth", value(*depth - 1))?;
      Ok(())
   })))
   .create(ModuleSpec::new("outer"))
   .unwrap();

   assert_eq!(*outer.get_as::<u32>("depth").unwrap(), 1);
   assert_eq!(inner.status(), Status::Done);
}

#[test]
fn test_nested_promotion_on_same_thread() {
   let inner = LazyLoader::new(Arc::new(initializer::from_fn(|module| {
      module.set("name", value(module.name().to_owned()))?;
      Ok(())
   })))
   .create(ModuleSpec::new("inner"))
   .unwrap();

   let dependency = Arc::clone(&inner);
   let outer = LazyLoader::new(Arc::new(initializer::from_fn(move |module| {
      let name = dependency.get_as::<String>("name")?;
      module.set("dep", value(format!("uses {name}")))?;
      Ok(())
   })))
   .create(ModuleSpec::new("outer"))
   .unwrap();

   assert_eq!(outer.get_as::<String>("dep").unwrap().as_str(), "uses inner");
   assert!(inner.is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_executes_once() {
   let counter = Arc::new(AtomicUsize::new(0));
   let module = LazyLoader::new(slow_counting(Arc::clone(&counter), Duration::from_millis(20)))
      .create(ModuleSpec::new("async"))
      .unwrap();

   let tasks: Vec<_> = (0..8)
      .map(|_| {
         let module = Arc::clone(&module);
         tokio::spawn(async move {
            let v = module.get_async("value").await.unwrap();
            *v.downcast::<u32>().unwrap()
         })
      })
      .collect();

   for task in tasks {
      assert_eq!(task.await.unwrap(), 42);
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
   module.load_async().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_waiters_wake_on_failure() {
   let counter = Arc::new(AtomicUsize::new(0));
   let hits = Arc::clone(&counter);
   let module = LazyLoader::new(Arc::new(initializer::from_fn(move |_| {
      hits.fetch_add(1, Ordering::SeqCst);
      // Long enough for waiters to give up yielding and block.
      thread::sleep(Duration::from_millis(100));
      Err("late failure".into())
   })))
   .create(ModuleSpec::new("fragile"))
   .unwrap();

   let tasks: Vec<_> = (0..8)
      .map(|_| {
         let module = Arc::clone(&module);
         tokio::spawn(async move { module.load_async().await })
      })
      .collect();

   let mut initializer_errors = 0;
   let mut poisoned = 0;
   for task in tasks {
      match task.await.unwrap() {
         Err(Error::Initializer { .. }) => initializer_errors += 1,
         Err(Error::Poisoned { .. }) => poisoned += 1,
         other => panic!("unexpected result: {other:?}"),
      }
   }
   assert_eq!(initializer_errors, 1);
   assert_eq!(poisoned, 7);
   assert_eq!(counter.load(Ordering::SeqCst), 1);
   assert_eq!(module.status(), Status::InProgress);
}
