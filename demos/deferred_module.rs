use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poly_lazy::{initializer, value, LazyLoader, ModuleSpec, Registry, Status};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
   let registry = Arc::new(Registry::new());
   let loader = LazyLoader::new(Arc::new(initializer::from_fn(|module| {
      // This closure runs only once
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Loading {}...", module.name());
      std::thread::sleep(std::time::Duration::from_millis(50));
      module.set("data", value("Expensive data".to_string()))?;
      module.set("level", value("info"))?;
      Ok(())
   })))
   .with_registry(&registry);

   let module = loader.create(ModuleSpec::new("telemetry")).unwrap();
   registry.register("telemetry", Arc::clone(&module));

   // Configured before first use; survives loading.
   module.set("level", value("debug")).unwrap();
   assert_eq!(module.status(), Status::NotStarted);

   let threads: Vec<_> = (0..5)
      .map(|_| {
         let module = Arc::clone(&module);
         std::thread::spawn(move || {
            println!("Thread access: {}", module.get_as::<String>("data").unwrap());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Initializer ran only once
   assert_eq!(*module.get_as::<&str>("level").unwrap(), "debug");
   println!("Final state: {module:?}");
}
